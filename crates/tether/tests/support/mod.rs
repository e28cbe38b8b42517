//! Shared fixtures for integration tests

use std::sync::Arc;
use std::time::Duration;
use tether::{Class, Function, Record, Thrown, Value};

/// The object most tests expose
pub fn service() -> Record {
    Record::new()
        .with("version", "1.0.0")
        .with(
            "greet",
            Value::Object(Arc::new(Function::sync("greet", |args| {
                let name = args.first().and_then(|a| a.as_data()?.as_str().map(str::to_string));
                Ok(Value::from(format!("Hello {}", name.unwrap_or_default())))
            }))),
        )
        .with(
            "fail",
            Value::Object(Arc::new(Function::sync("fail", |_| Err(Thrown::error("boom"))))),
        )
        .with(
            "throwValue",
            Value::Object(Arc::new(Function::sync("throwValue", |_| {
                Err(Thrown::value(serde_json::json!({ "code": 7 })))
            }))),
        )
        .with(
            "delay",
            Value::Object(Arc::new(Function::new("delay", |_, args: Vec<Value>| async move {
                let ms = args.first().and_then(|a| a.as_data()?.as_u64()).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(Value::from(ms))
            }))),
        )
        .with("counter", Value::Object(Arc::new(Record::new().with("value", 0))))
        .with(
            "Counter",
            Value::Object(Arc::new(Class::sync("Counter", |args| {
                let start = args.into_iter().next().unwrap_or_else(|| Value::from(0));
                Ok(Value::Object(Arc::new(Record::new().with("value", start))))
            }))),
        )
}

/// Unwrap plain data or fail the test
pub fn data(value: Value) -> serde_json::Value {
    match value {
        Value::Data(data) => data,
        other => panic!("expected plain data, got {:?}", other),
    }
}
