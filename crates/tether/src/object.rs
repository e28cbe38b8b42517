//! Local objects reachable through an exposure

use crate::value::Value;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tether_proto::Thrown;

/// An object whose properties, calls and construction can be driven remotely.
///
/// Every method has a default that fails the way a non-callable,
/// read-only object would, so implementors only override what they support.
#[async_trait]
pub trait Object: Send + Sync {
    /// Read a property. Missing properties read as `null`.
    fn get(&self, name: &str) -> Result<Value, Thrown>;

    /// Assign a property
    fn set(&self, name: &str, _value: Value) -> Result<(), Thrown> {
        Err(Thrown::type_error(format!(
            "Cannot assign to read only property '{}'",
            name
        )))
    }

    /// Invoke the object with a receiver and arguments
    async fn call(&self, _this: Value, _args: Vec<Value>) -> Result<Value, Thrown> {
        Err(Thrown::type_error("object is not a function"))
    }

    /// Instantiate the object with arguments
    async fn construct(&self, _args: Vec<Value>) -> Result<Value, Thrown> {
        Err(Thrown::type_error("object is not a constructor"))
    }

    /// Plain-data copy, or `None` if the object cannot be cloned
    fn snapshot(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Mutable bag of named properties
#[derive(Default)]
pub struct Record {
    props: RwLock<HashMap<String, Value>>,
}

impl Record {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property insertion
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a property
    pub fn insert(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.props
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Property names, unordered
    pub fn keys(&self) -> Vec<String> {
        self.props
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Build a value from JSON, turning nested objects into records
    pub fn from_json(data: serde_json::Value) -> Value {
        match data {
            serde_json::Value::Object(map) => {
                let record = Record::new();
                for (key, value) in map {
                    record.insert(key, Record::from_json(value));
                }
                Value::Object(Arc::new(record))
            }
            other => Value::Data(other),
        }
    }
}

#[async_trait]
impl Object for Record {
    fn get(&self, name: &str) -> Result<Value, Thrown> {
        Ok(self
            .props
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_else(Value::null))
    }

    fn set(&self, name: &str, value: Value) -> Result<(), Thrown> {
        self.insert(name, value);
        Ok(())
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        let props = self.props.read().unwrap_or_else(PoisonError::into_inner);
        let mut map = serde_json::Map::with_capacity(props.len());
        for (name, value) in props.iter() {
            map.insert(name.clone(), value.snapshot()?);
        }
        Some(serde_json::Value::Object(map))
    }
}

type Body = dyn Fn(Value, Vec<Value>) -> BoxFuture<'static, Result<Value, Thrown>> + Send + Sync;
type Ctor = dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Thrown>> + Send + Sync;

/// Callable object backed by a closure
pub struct Function {
    name: String,
    body: Arc<Body>,
}

impl Function {
    /// Async function receiving `this` and the arguments
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Thrown>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |this: Value, args: Vec<Value>| body(this, args).boxed()),
        }
    }

    /// Synchronous function of the arguments
    pub fn sync<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        Self::new(name, move |_this, args| future::ready(body(args)))
    }

    /// Synchronous function that also sees its receiver
    pub fn method<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        Self::new(name, move |this, args| future::ready(body(this, args)))
    }
}

#[async_trait]
impl Object for Function {
    fn get(&self, name: &str) -> Result<Value, Thrown> {
        match name {
            "name" => Ok(Value::from(self.name.as_str())),
            _ => Ok(Value::null()),
        }
    }

    async fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, Thrown> {
        (self.body)(this, args).await
    }
}

/// Constructible object backed by a closure, with static properties
pub struct Class {
    name: String,
    ctor: Arc<Ctor>,
    statics: Record,
}

impl Class {
    /// Class with an async constructor
    pub fn new<F, Fut>(name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Thrown>> + Send + 'static,
    {
        Self {
            name: name.into(),
            ctor: Arc::new(move |args: Vec<Value>| ctor(args).boxed()),
            statics: Record::new(),
        }
    }

    /// Class with a synchronous constructor
    pub fn sync<F>(name: impl Into<String>, ctor: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        Self::new(name, move |args| future::ready(ctor(args)))
    }

    /// Add a static property
    pub fn with_static(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.statics.insert(name, value);
        self
    }
}

#[async_trait]
impl Object for Class {
    fn get(&self, name: &str) -> Result<Value, Thrown> {
        match name {
            "name" => Ok(Value::from(self.name.as_str())),
            _ => self.statics.get(name),
        }
    }

    fn set(&self, name: &str, value: Value) -> Result<(), Thrown> {
        self.statics.set(name, value)
    }

    async fn call(&self, _this: Value, _args: Vec<Value>) -> Result<Value, Thrown> {
        Err(Thrown::type_error(format!(
            "Class constructor {} cannot be invoked without 'new'",
            self.name
        )))
    }

    async fn construct(&self, args: Vec<Value>) -> Result<Value, Thrown> {
        (self.ctor)(args).await
    }
}

/// Read one property of any value
pub fn property(value: &Value, name: &str) -> Result<Value, Thrown> {
    match value {
        Value::Object(object) | Value::Handle(object) => object.get(name),
        Value::Data(serde_json::Value::Null) => Err(Thrown::type_error(format!(
            "Cannot read properties of null (reading '{}')",
            name
        ))),
        Value::Data(serde_json::Value::Object(map)) => {
            Ok(map.get(name).cloned().map(Value::Data).unwrap_or_else(Value::null))
        }
        Value::Data(serde_json::Value::Array(items)) => Ok(match name {
            "length" => Value::from(items.len() as u64),
            index => index
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .map(Value::Data)
                .unwrap_or_else(Value::null),
        }),
        Value::Data(serde_json::Value::String(s)) if name == "length" => {
            Ok(Value::from(s.chars().count() as u64))
        }
        Value::Transfer(transfer) => property(transfer.value(), name),
        _ => Ok(Value::null()),
    }
}

/// Walk a property path from `root`. The empty path is `root` itself.
pub fn resolve(root: Value, path: &[String]) -> Result<Value, Thrown> {
    path.iter().try_fold(root, |current, name| property(&current, name))
}

/// Resolve a path to `(parent, target)`; for the empty path both are `root`
pub fn resolve_with_parent(root: Value, path: &[String]) -> Result<(Value, Value), Thrown> {
    match path.split_last() {
        Some((last, parents)) => {
            let parent = resolve(root, parents)?;
            let target = property(&parent, last)?;
            Ok((parent, target))
        }
        None => Ok((root.clone(), root)),
    }
}

/// Assign `name` on `target`
pub fn assign(target: &Value, name: &str, value: Value) -> Result<(), Thrown> {
    match target {
        Value::Object(object) | Value::Handle(object) => object.set(name, value),
        Value::Data(serde_json::Value::Null) => Err(Thrown::type_error(format!(
            "Cannot set properties of null (setting '{}')",
            name
        ))),
        other => Err(Thrown::type_error(format!(
            "Cannot create property '{}' on {}",
            name,
            other.kind()
        ))),
    }
}

/// Call `target` with receiver `this`
pub async fn invoke(target: &Value, this: Value, args: Vec<Value>) -> Result<Value, Thrown> {
    match target {
        Value::Object(object) | Value::Handle(object) => object.call(this, args).await,
        other => Err(Thrown::type_error(format!("{} is not a function", other.kind()))),
    }
}

/// Construct a new instance from `target`
pub async fn instantiate(target: &Value, args: Vec<Value>) -> Result<Value, Thrown> {
    match target {
        Value::Object(object) | Value::Handle(object) => object.construct(args).await,
        other => Err(Thrown::type_error(format!("{} is not a constructor", other.kind()))),
    }
}
