//! Conversion between [`Value`]s and wire values

use crate::channel::Port;
use crate::registry::Registry;
use crate::value::Value;
use crate::{ProxyError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tether_proto::{ProtocolError, Raw, WireValue};
use uuid::Uuid;

/// Encodes values for sending and decodes received ones, consulting a
/// [`Registry`] of transfer handlers
#[derive(Clone, Default)]
pub struct Codec {
    registry: Arc<Registry>,
}

impl Codec {
    /// Codec over a custom registry
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The handler registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode one value, returning the ports that must move with it.
    ///
    /// A registered handler that claims the value wins; otherwise the value
    /// is copied as RAW data. Values that are neither claimed nor cloneable
    /// fail with [`ProxyError::DataClone`].
    pub fn encode(&self, value: Value) -> Result<(WireValue, Vec<Port>)> {
        if let Some((name, handler)) = self.registry.find(&value) {
            let name = name.to_string();
            let handler = handler.clone();
            let (wire, ports) = handler.serialize(value, self)?;
            return Ok((WireValue::handler(name, wire), ports));
        }
        self.encode_raw(value)
    }

    fn encode_raw(&self, value: Value) -> Result<(WireValue, Vec<Port>)> {
        match value {
            Value::Port(port) => Ok((WireValue::port(port.id()), vec![port])),
            Value::Transfer(transfer) => {
                let (wire, mut ports) = self.encode_raw(*transfer.value)?;
                merge_ports(&mut ports, transfer.ports);
                Ok((wire, ports))
            }
            other => match other.snapshot() {
                Some(data) => Ok((WireValue::data(data), Vec::new())),
                None => Err(ProxyError::DataClone(format!(
                    "{} could not be cloned",
                    other.kind()
                ))),
            },
        }
    }

    /// Encode an argument list, concatenating every argument's ports
    pub fn encode_args<I>(&self, args: I) -> Result<(Vec<WireValue>, Vec<Port>)>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut wires = Vec::new();
        let mut ports = Vec::new();
        for arg in args {
            let (wire, arg_ports) = self.encode(arg)?;
            wires.push(wire);
            merge_ports(&mut ports, arg_ports);
        }
        Ok((wires, ports))
    }

    /// Decode one wire value against the ports its envelope carried.
    ///
    /// A HANDLER value whose handler re-raises (the `throw` handler) yields
    /// `Err` carrying the failure.
    pub fn decode(&self, wire: WireValue, transfers: &mut Transfers) -> Result<Value> {
        match wire {
            WireValue::Raw { value: Raw::Data(data) } => Ok(Value::Data(data)),
            WireValue::Raw { value: Raw::Port(id) } => Ok(Value::Port(transfers.take(id)?)),
            WireValue::Handler { name, value } => {
                let handler = self
                    .registry
                    .get(&name)
                    .cloned()
                    .ok_or(ProxyError::UnknownHandler(name))?;
                handler.deserialize(value, self, transfers)
            }
        }
    }

    /// Decode an argument list
    pub fn decode_args(&self, args: Vec<WireValue>, transfers: &mut Transfers) -> Result<Vec<Value>> {
        args.into_iter()
            .map(|arg| self.decode(arg, transfers))
            .collect()
    }
}

fn merge_ports(ports: &mut Vec<Port>, extra: Vec<Port>) {
    for port in extra {
        if !ports.contains(&port) {
            ports.push(port);
        }
    }
}

/// Ports received with one message, looked up by id while decoding
#[derive(Debug, Default)]
pub struct Transfers {
    ports: HashMap<Uuid, Port>,
}

impl Transfers {
    /// Index the ports of an envelope
    pub fn new(ports: Vec<Port>) -> Self {
        Self {
            ports: ports.into_iter().map(|port| (port.id(), port)).collect(),
        }
    }

    /// The port referenced by `id`
    pub fn take(&mut self, id: Uuid) -> Result<Port> {
        self.ports
            .get(&id)
            .cloned()
            .ok_or(ProxyError::Protocol(ProtocolError::MissingTransfer(id)))
    }

    /// Number of ports
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Whether no port was received
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
