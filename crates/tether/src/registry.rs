//! Named transfer handlers for values that cannot be copied by value

use crate::channel::{MessageChannel, Port};
use crate::codec::{Codec, Transfers};
use crate::expose::Exposer;
use crate::remote::Wrap;
use crate::value::Value;
use crate::{ProxyError, Result};
use std::sync::Arc;
use tether_proto::Thrown;
use tracing::debug;
use uuid::Uuid;

/// Name of the built-in handler that passes objects by reference
pub const PROXY_HANDLER: &str = "proxy";

/// Name of the built-in handler that carries thrown failures
pub const THROW_HANDLER: &str = "throw";

/// Custom serialization for a category of values.
///
/// `serialize` may return ports that must move with the encoded value;
/// `deserialize` finds them in the receiving envelope's [`Transfers`].
pub trait TransferHandler: Send + Sync {
    /// Whether this handler claims `value`
    fn can_handle(&self, value: &Value) -> bool;

    /// Encode a claimed value to wire data plus ports to transfer
    fn serialize(&self, value: Value, codec: &Codec) -> Result<(serde_json::Value, Vec<Port>)>;

    /// Rebuild a value from wire data.
    ///
    /// Returning `Err` re-raises the failure at the receiver, which is how
    /// the `throw` handler turns a wire value back into an error.
    fn deserialize(&self, wire: serde_json::Value, codec: &Codec, transfers: &mut Transfers) -> Result<Value>;
}

/// Ordered set of named transfer handlers.
///
/// Lookup for encoding tries handlers in registration order; the first one
/// that claims the value wins. Re-registering a name replaces the handler
/// in place.
#[derive(Clone)]
pub struct Registry {
    handlers: Vec<(String, Arc<dyn TransferHandler>)>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(PROXY_HANDLER, ProxyHandler);
        registry.register(THROW_HANDLER, ThrowHandler);
        registry
    }
}

impl Registry {
    /// Registry with no handlers, not even the built-ins
    pub fn empty() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Register or replace a handler
    pub fn register(&mut self, name: impl Into<String>, handler: impl TransferHandler + 'static) {
        self.register_arc(name, Arc::new(handler));
    }

    /// Register or replace a shared handler
    pub fn register_arc(&mut self, name: impl Into<String>, handler: Arc<dyn TransferHandler>) {
        let name = name.into();
        match self.handlers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                debug!(handler = %name, "replacing transfer handler");
                slot.1 = handler;
            }
            None => self.handlers.push((name, handler)),
        }
    }

    /// Remove a handler by name
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn TransferHandler>> {
        let index = self.handlers.iter().position(|(existing, _)| existing == name)?;
        Some(self.handlers.remove(index).1)
    }

    /// Handler registered under `name`
    pub fn get(&self, name: &str) -> Option<&Arc<dyn TransferHandler>> {
        self.handlers
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, handler)| handler)
    }

    /// First handler that claims `value`
    pub fn find(&self, value: &Value) -> Option<(&str, &Arc<dyn TransferHandler>)> {
        self.handlers
            .iter()
            .find(|(_, handler)| handler.can_handle(value))
            .map(|(name, handler)| (name.as_str(), handler))
    }

    /// Registered names in lookup order
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// Sends proxy-marked objects by reference.
///
/// The sender exposes the object on one end of a fresh channel and
/// transfers the other end; the receiver wraps that end into a [`Remote`].
///
/// [`Remote`]: crate::Remote
pub struct ProxyHandler;

impl TransferHandler for ProxyHandler {
    fn can_handle(&self, value: &Value) -> bool {
        matches!(value, Value::Handle(_))
    }

    fn serialize(&self, value: Value, codec: &Codec) -> Result<(serde_json::Value, Vec<Port>)> {
        let object = match value {
            Value::Handle(object) => object,
            other => {
                return Err(ProxyError::DataClone(format!(
                    "proxy handler cannot send a {}",
                    other.kind()
                )))
            }
        };

        let (local, remote) = MessageChannel::new().into_ports();
        Exposer::from_arc(object)
            .with_codec(codec.clone())
            .expose(local);

        Ok((serde_json::Value::String(remote.id().to_string()), vec![remote]))
    }

    fn deserialize(&self, wire: serde_json::Value, codec: &Codec, transfers: &mut Transfers) -> Result<Value> {
        let id: Uuid = serde_json::from_value(wire).map_err(tether_proto::ProtocolError::from)?;
        let port = transfers.take(id)?;

        Ok(Value::Remote(Wrap::new(port).with_codec(codec.clone()).build()))
    }
}

/// Carries thrown failures so they re-raise at the receiver
pub struct ThrowHandler;

impl TransferHandler for ThrowHandler {
    fn can_handle(&self, value: &Value) -> bool {
        matches!(value, Value::Thrown(_))
    }

    fn serialize(&self, value: Value, _codec: &Codec) -> Result<(serde_json::Value, Vec<Port>)> {
        match value {
            Value::Thrown(thrown) => Ok((thrown.to_wire(), Vec::new())),
            other => Err(ProxyError::DataClone(format!(
                "throw handler cannot send a {}",
                other.kind()
            ))),
        }
    }

    fn deserialize(&self, wire: serde_json::Value, _codec: &Codec, _transfers: &mut Transfers) -> Result<Value> {
        Err(ProxyError::Thrown(Thrown::from_wire(wire)?))
    }
}
