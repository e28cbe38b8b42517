//! Values that cross the proxy boundary

use crate::channel::Port;
use crate::object::Object;
use crate::remote::Remote;
use std::fmt;
use std::sync::Arc;
use tether_proto::Thrown;

/// A value passed to, returned from, or stored behind a proxy.
///
/// Plain data travels by copy. [`Value::Handle`] travels by reference through
/// the `proxy` transfer handler, [`Value::Thrown`] through the `throw`
/// handler, and [`Value::Port`] moves its channel end to the receiver.
#[derive(Clone)]
pub enum Value {
    /// Structured-cloneable data
    Data(serde_json::Value),
    /// Local object, copied by value when it has a snapshot
    Object(Arc<dyn Object>),
    /// Local object marked to be sent by reference
    Handle(Arc<dyn Object>),
    /// Proxy to an object on the other side of a channel
    Remote(Remote),
    /// Channel end, moved on send
    Port(Port),
    /// Value sent together with a transfer list
    Transfer(Transfer),
    /// Failure value produced by an operation
    Thrown(Thrown),
}

/// A value paired with the ports that must move with it
#[derive(Clone)]
pub struct Transfer {
    pub(crate) value: Box<Value>,
    pub(crate) ports: Vec<Port>,
}

impl Transfer {
    /// The wrapped value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Ports moved along with the value
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }
}

/// Mark a local object to be sent by reference
pub fn proxy(object: impl Object + 'static) -> Value {
    Value::Handle(Arc::new(object))
}

/// Attach a transfer list to a value
pub fn transfer(value: impl Into<Value>, ports: Vec<Port>) -> Value {
    Value::Transfer(Transfer {
        value: Box::new(value.into()),
        ports,
    })
}

impl Value {
    /// The `null` value
    pub fn null() -> Self {
        Self::Data(serde_json::Value::Null)
    }

    /// Whether this is plain `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Data(serde_json::Value::Null))
    }

    /// Borrow the data, if plain data
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Take the data, if plain data
    pub fn into_data(self) -> Option<serde_json::Value> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Borrow the local object, marked or not
    pub fn as_object(&self) -> Option<&Arc<dyn Object>> {
        match self {
            Self::Object(object) | Self::Handle(object) => Some(object),
            _ => None,
        }
    }

    /// Take the remote proxy
    pub fn into_remote(self) -> Option<Remote> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Take the port
    pub fn into_port(self) -> Option<Port> {
        match self {
            Self::Port(port) => Some(port),
            _ => None,
        }
    }

    /// Short name of the variant, for logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Object(_) => "object",
            Self::Handle(_) => "proxy-marked object",
            Self::Remote(_) => "remote proxy",
            Self::Port(_) => "port",
            Self::Transfer(_) => "transfer",
            Self::Thrown(_) => "thrown value",
        }
    }

    /// Deep copy as plain data, if the value is cloneable
    pub fn snapshot(&self) -> Option<serde_json::Value> {
        match self {
            Self::Data(data) => Some(data.clone()),
            Self::Object(object) => object.snapshot(),
            Self::Transfer(transfer) => transfer.value.snapshot(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(data) => f.debug_tuple("Data").field(data).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
            Self::Handle(_) => f.write_str("Handle(..)"),
            Self::Remote(remote) => f.debug_tuple("Remote").field(&remote.path()).finish(),
            Self::Port(port) => f.debug_tuple("Port").field(&port.id()).finish(),
            Self::Transfer(transfer) => f
                .debug_struct("Transfer")
                .field("value", &transfer.value)
                .field("ports", &transfer.ports.len())
                .finish(),
            Self::Thrown(thrown) => f.debug_tuple("Thrown").field(thrown).finish(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(data: serde_json::Value) -> Self {
        Self::Data(data)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Data(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Data(s.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Data(b.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Data(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Data(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Data(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Data(n.into())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::null()
    }
}

impl From<Remote> for Value {
    fn from(remote: Remote) -> Self {
        Self::Remote(remote)
    }
}

impl From<Port> for Value {
    fn from(port: Port) -> Self {
        Self::Port(port)
    }
}

impl From<Thrown> for Value {
    fn from(thrown: Thrown) -> Self {
        Self::Thrown(thrown)
    }
}
