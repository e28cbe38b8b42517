//! Demonstration object graph

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tether::{Function, Record, Thrown, Value};

/// Longest sleep `sleep` agrees to
pub const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Root object served by the worker
pub fn root() -> Record {
    Record::new()
        .with("version", env!("CARGO_PKG_VERSION"))
        .with("greet", function(Function::sync("greet", greet)))
        .with("add", function(Function::sync("add", add)))
        .with("fail", function(Function::sync("fail", fail)))
        .with("sleep", function(Function::new("sleep", |_, args| sleep(args))))
        .with("counter", Record::from_json(json!({ "value": 0 })))
}

fn function(f: Function) -> Value {
    Value::Object(Arc::new(f))
}

fn greet(args: Vec<Value>) -> Result<Value, Thrown> {
    let name = match args.first().and_then(Value::as_data) {
        Some(serde_json::Value::String(name)) => name.clone(),
        Some(other) => other.to_string(),
        None => "stranger".to_string(),
    };
    Ok(Value::from(format!("Hello {}", name)))
}

fn add(args: Vec<Value>) -> Result<Value, Thrown> {
    let mut sum = 0.0;
    for (i, arg) in args.iter().enumerate() {
        let n = arg
            .as_data()
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| Thrown::type_error(format!("argument {} is not a number", i)))?;
        sum += n;
    }
    Ok(Value::from(json!(sum)))
}

fn fail(args: Vec<Value>) -> Result<Value, Thrown> {
    let message = args
        .first()
        .and_then(Value::as_data)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("boom")
        .to_string();
    Err(Thrown::error(message))
}

async fn sleep(args: Vec<Value>) -> Result<Value, Thrown> {
    let ms = args
        .first()
        .and_then(Value::as_data)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| Thrown::type_error("sleep expects milliseconds"))?;

    let duration = Duration::from_millis(ms);
    if duration > MAX_SLEEP {
        return Err(Thrown::named("RangeError", format!("{}ms is longer than {:?}", ms, MAX_SLEEP)));
    }
    tokio::time::sleep(duration).await;
    Ok(Value::from(ms))
}
