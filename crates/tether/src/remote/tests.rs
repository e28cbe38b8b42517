//! Round-trip tests for proxies against an in-process exposure

use super::*;
use crate::channel::MessageChannel;
use crate::expose::{expose, Exposer, Exposure};
use crate::object::{Class, Function, Record};
use crate::registry::TransferHandler;
use crate::value::proxy;
use serde_json::json;
use tether_proto::Thrown;

fn calculator() -> Record {
    Record::new()
        .with("name", "calc")
        .with(
            "greet",
            Value::Object(Arc::new(Function::sync("greet", |args| {
                let name = args.first().and_then(|a| a.as_data()?.as_str().map(str::to_string));
                Ok(Value::from(format!("Hello {}", name.unwrap_or_default())))
            }))),
        )
        .with(
            "add",
            Value::Object(Arc::new(Function::sync("add", |args| {
                let sum: i64 = args.iter().filter_map(|a| a.as_data()?.as_i64()).sum();
                Ok(Value::from(sum))
            }))),
        )
        .with(
            "whoami",
            Value::Object(Arc::new(Function::method("whoami", |this, _| {
                crate::object::property(&this, "name")
            }))),
        )
        .with(
            "fail",
            Value::Object(Arc::new(Function::sync("fail", |_| Err(Thrown::error("boom"))))),
        )
        .with("counter", Value::Object(Arc::new(Record::new().with("value", 0))))
        .with(
            "Point",
            Value::Object(Arc::new(Class::sync("Point", |args| {
                let mut args = args.into_iter();
                let point = Record::new()
                    .with("x", args.next().unwrap_or_else(Value::null))
                    .with("y", args.next().unwrap_or_else(Value::null));
                Ok(Value::Object(Arc::new(point)))
            }))),
        )
        .with(
            "notify",
            Value::Object(Arc::new(Function::new("notify", |_, args: Vec<Value>| async move {
                let callback = args
                    .into_iter()
                    .next()
                    .and_then(Value::into_remote)
                    .ok_or_else(|| Thrown::type_error("callback is not a proxy"))?;
                let answer = callback.call(vec![Value::from(41)]).await.map_err(Thrown::from)?;
                Ok(answer)
            }))),
        )
}

fn connect() -> (Exposure, Remote) {
    let (server, client) = MessageChannel::new().into_ports();
    let exposure = expose(calculator(), server);
    (exposure, wrap(client))
}

fn data(value: Value) -> serde_json::Value {
    match value {
        Value::Data(data) => data,
        other => panic!("expected data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_call_function() {
    let (_exposure, remote) = connect();

    let greeting = remote.get("greet").call(vec![Value::from("World")]).await.unwrap();
    assert_eq!(data(greeting), json!("Hello World"));
}

#[tokio::test]
async fn test_read_property() {
    let (_exposure, remote) = connect();

    let name = remote.get("name").await.unwrap();
    assert_eq!(data(name), json!("calc"));

    let missing = remote.get("nope").await.unwrap();
    assert!(missing.is_null());
}

#[tokio::test]
async fn test_set_then_get() {
    let (_exposure, remote) = connect();

    let ack = remote.get("counter").set("value", 5).await.unwrap();
    assert_eq!(data(ack), json!(true));

    let value = remote.get("counter").get("value").await.unwrap();
    assert_eq!(data(value), json!(5));
}

#[tokio::test]
async fn test_remote_failure_is_reraised() {
    let (_exposure, remote) = connect();

    let err = remote.get("fail").call(vec![]).await.unwrap_err();
    let thrown = err.thrown().expect("a thrown failure");
    assert_eq!(thrown.details().map(|d| d.message.as_str()), Some("boom"));
}

#[tokio::test]
async fn test_calling_non_function_throws_type_error() {
    let (_exposure, remote) = connect();

    let err = remote.get("name").call(vec![]).await.unwrap_err();
    assert_eq!(
        err.thrown().and_then(|t| t.details()).map(|d| d.name.as_str()),
        Some("TypeError")
    );
}

#[tokio::test]
async fn test_receiver_is_the_parent() {
    let (_exposure, remote) = connect();

    let bound = remote.get("whoami").bind().unwrap();
    let name = bound.call(vec![]).await.unwrap();
    assert_eq!(data(name), json!("calc"));
}

#[tokio::test]
async fn test_concurrent_calls_each_get_their_answer() {
    let (_exposure, remote) = connect();

    let calls = (0..20).map(|i| {
        let add = remote.get("add");
        async move { add.call(vec![Value::from(i), Value::from(i)]).await }
    });
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(data(result.unwrap()), json!(2 * i as i64));
    }
}

#[tokio::test]
async fn test_construct_returns_proxy() {
    let (_exposure, remote) = connect();

    let point = remote
        .get("Point")
        .construct(vec![Value::from(1), Value::from(2)])
        .await
        .unwrap()
        .into_remote()
        .expect("instances come back by reference");

    assert_eq!(data(point.get("y").await.unwrap()), json!(2));

    point.set("x", 10).await.unwrap();
    assert_eq!(data(point.get("x").await.unwrap()), json!(10));
}

#[tokio::test]
async fn test_construct_from_data_returning_class() {
    let root = Record::new().with(
        "Settings",
        Value::Object(Arc::new(Class::sync("Settings", |_| {
            Ok(Value::from(json!({ "theme": "dark" })))
        }))),
    );
    let (server, client) = MessageChannel::new().into_ports();
    let _exposure = expose(root, server);
    let remote = wrap(client);

    let settings = remote
        .get("Settings")
        .construct(vec![])
        .await
        .unwrap()
        .into_remote()
        .expect("instances come back by reference");

    settings.set("theme", "light").await.unwrap();
    assert_eq!(data(settings.get("theme").await.unwrap()), json!("light"));
}

#[tokio::test]
async fn test_proxy_marked_argument_is_called_back() {
    let (_exposure, remote) = connect();

    let callback = Function::sync("callback", |args| {
        let n = args.first().and_then(|a| a.as_data()?.as_i64()).unwrap_or_default();
        Ok(Value::from(n + 1))
    });
    let answer = remote.get("notify").call(vec![proxy(callback)]).await.unwrap();

    assert_eq!(data(answer), json!(42));
}

#[tokio::test]
async fn test_property_access_is_lazy() {
    let (_exposure, remote) = connect();

    let deep = remote.get("a").get("b").get("c");
    assert_eq!(deep.path(), ["a", "b", "c"]);
    assert_eq!(remote.link.correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_root_resolves_to_itself() {
    let (_exposure, remote) = connect();

    let resolved = remote.clone().await.unwrap().into_remote().unwrap();
    assert!(resolved.path().is_empty());
}

#[tokio::test]
async fn test_release_poisons_every_derived_proxy() {
    let (exposure, remote) = connect();
    let add = remote.get("add");

    remote.release().await.unwrap();

    assert!(remote.is_released());
    assert!(add.is_released());
    assert!(matches!(add.call(vec![]).await, Err(ProxyError::Released)));
    assert!(matches!(remote.get("name").await, Err(ProxyError::Released)));
    assert!(matches!(remote.release().await, Err(ProxyError::Released)));
    assert!(matches!(remote.bind(), Err(ProxyError::Released)));
    assert!(exposure.is_released());
}

#[tokio::test]
async fn test_create_endpoint_serves_the_same_object() {
    let (_exposure, remote) = connect();

    let port = remote.create_endpoint().await.unwrap();
    let second = wrap(port);

    assert_eq!(data(second.get("name").await.unwrap()), json!("calc"));

    // Releasing the second connection leaves the first alone
    second.release().await.unwrap();
    assert_eq!(data(remote.get("name").await.unwrap()), json!("calc"));
}

#[tokio::test]
async fn test_timeout_without_exposure() {
    let (_server, client) = MessageChannel::new().into_ports();
    let remote = Wrap::new(client)
        .with_timeout(Duration::from_millis(20))
        .build();

    let result = remote.get("anything").await;
    assert!(matches!(result, Err(ProxyError::Timeout { .. })));
}

struct Celsius;

impl TransferHandler for Celsius {
    fn can_handle(&self, value: &Value) -> bool {
        value
            .as_data()
            .and_then(|d| d.get("celsius"))
            .is_some_and(|c| c.is_number())
    }

    fn serialize(&self, value: Value, _codec: &Codec) -> Result<(serde_json::Value, Vec<Port>)> {
        let c = value
            .as_data()
            .and_then(|d| d["celsius"].as_f64())
            .unwrap_or_default();
        Ok((json!(c * 9.0 / 5.0 + 32.0), Vec::new()))
    }

    fn deserialize(&self, wire: serde_json::Value, _codec: &Codec, _transfers: &mut Transfers) -> Result<Value> {
        let f = wire.as_f64().unwrap_or_default();
        Ok(Value::from(json!({ "fahrenheit": f })))
    }
}

#[tokio::test]
async fn test_custom_handler_on_both_sides() {
    let mut registry = Registry::default();
    registry.register("celsius", Celsius);
    let codec = Codec::new(registry);

    let (server, client) = MessageChannel::new().into_ports();
    let _exposure = Exposer::new(calculator()).with_codec(codec.clone()).expose(server);
    let remote = Wrap::new(client).with_codec(codec).build();

    remote
        .get("counter")
        .set("value", json!({ "celsius": 100 }))
        .await
        .unwrap();
    let stored = remote.get("counter").get("value").await.unwrap();

    // The value was stored decoded, and it is plain data on the way back
    assert_eq!(data(stored), json!({ "fahrenheit": 212.0 }));
}

#[tokio::test]
async fn test_unregistered_handler_on_receiver_fails() {
    let mut registry = Registry::default();
    registry.register("celsius", Celsius);

    let (server, client) = MessageChannel::new().into_ports();
    let _exposure = expose(calculator(), server);
    let remote = Wrap::new(client).with_registry(registry).build();

    let err = remote
        .get("counter")
        .set("value", json!({ "celsius": 1 }))
        .await
        .unwrap_err();
    assert_eq!(
        err.thrown().and_then(|t| t.details()).map(|d| d.message.as_str()),
        Some("Unknown transfer handler: celsius")
    );
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn json_leaf() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            Just(serde_json::Value::Null),
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-zA-Z0-9 ]{0,24}".prop_map(serde_json::Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = serde_json::Value> {
        json_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_set_then_get_returns_the_value(name in "[a-z]{1,8}", value in json_value()) {
            tokio_test::block_on(async {
                let (_exposure, remote) = connect();
                let slot = remote.get("counter");

                slot.set(name.clone(), value.clone()).await.unwrap();
                let read = slot.get(name).await.unwrap();

                prop_assert_eq!(read.as_data(), Some(&value));
                Ok(())
            })?;
        }
    }
}
