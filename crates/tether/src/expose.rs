//! Serving a local object to the other side of an endpoint

use crate::channel::{MessageChannel, Port};
use crate::codec::{Codec, Transfers};
use crate::endpoint::{Endpoint, Envelope, ListenerId};
use crate::object::{self, Object, Record};
use crate::registry::THROW_HANDLER;
use crate::value::{transfer, Value};
use crate::{ProxyError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tether_proto::{Message, ProtocolError, Request, Response, Thrown, WireValue};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Expose `root` on `endpoint` with the default codec
pub fn expose<O, E>(root: O, endpoint: E) -> Exposure
where
    O: Object + 'static,
    E: Endpoint + 'static,
{
    Exposer::new(root).expose(endpoint)
}

/// Builder for exposures
pub struct Exposer {
    root: Arc<dyn Object>,
    codec: Codec,
}

impl Exposer {
    /// Expose `root`
    pub fn new(root: impl Object + 'static) -> Self {
        Self::from_arc(Arc::new(root))
    }

    /// Expose an already shared object
    pub fn from_arc(root: Arc<dyn Object>) -> Self {
        Self {
            root,
            codec: Codec::default(),
        }
    }

    /// Use a codec with a custom handler registry
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Start serving on `endpoint`
    pub fn expose<E: Endpoint + 'static>(self, endpoint: E) -> Exposure {
        self.expose_arc(Arc::new(endpoint))
    }

    /// Start serving on a shared endpoint.
    ///
    /// Every inbound request is handled on its own task, so a slow call does
    /// not hold up the ones behind it and replies may leave out of order.
    /// Must be called from within a tokio runtime.
    pub fn expose_arc(self, endpoint: Arc<dyn Endpoint>) -> Exposure {
        let state = Arc::new(ExposureState {
            root: self.root,
            codec: self.codec,
            endpoint: endpoint.clone(),
            listener: OnceLock::new(),
            released: AtomicBool::new(false),
        });

        let handler = state.clone();
        let listener = endpoint.add_listener(Arc::new(move |envelope: Envelope| {
            let Envelope { message, transfer } = envelope;
            let request = match message {
                Message::Request(Request::Unknown) => {
                    debug!("ignoring request of unrecognized type");
                    return;
                }
                Message::Request(request) => request,
                Message::Response(response) => {
                    debug!(id = %response.id, "ignoring response on exposed endpoint");
                    return;
                }
            };

            let state = handler.clone();
            tokio::spawn(async move {
                state.handle(request, transfer).await;
            });
        }));
        // RELEASE detaches this listener by id
        let _ = state.listener.set(listener);
        endpoint.start();

        debug!(listener_id = listener, "object exposed");
        Exposure { state }
    }
}

/// Handle to a live exposure
#[derive(Clone)]
pub struct Exposure {
    state: Arc<ExposureState>,
}

impl Exposure {
    /// The listener serving requests
    pub fn listener_id(&self) -> Option<ListenerId> {
        self.state.listener.get().copied()
    }

    /// Whether a RELEASE request ended this exposure
    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    /// The endpoint being served
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.state.endpoint
    }
}

struct ExposureState {
    root: Arc<dyn Object>,
    codec: Codec,
    endpoint: Arc<dyn Endpoint>,
    listener: OnceLock<ListenerId>,
    released: AtomicBool,
}

impl ExposureState {
    async fn handle(self: Arc<Self>, request: Request, transfer: Vec<Port>) {
        let Some(id) = request.id() else {
            return;
        };
        let releasing = matches!(request, Request::Release { .. });
        debug!(%id, kind = request.kind(), path = ?request.path(), "handling request");

        let outcome = match self.perform(request, transfer).await {
            Ok(value) => value,
            Err(thrown) => {
                debug!(%id, "operation threw: {}", thrown);
                Value::Thrown(thrown)
            }
        };
        self.reply(id, outcome);

        if releasing {
            self.release();
        }
    }

    async fn perform(&self, request: Request, transfer_list: Vec<Port>) -> std::result::Result<Value, Thrown> {
        let mut transfers = Transfers::new(transfer_list);
        let root = Value::Object(self.root.clone());

        match request {
            Request::Get { path, .. } => object::resolve(root, &path),
            Request::Set { path, value, .. } => {
                let value = self.codec.decode(value, &mut transfers)?;
                let Some((name, parents)) = path.split_last() else {
                    return Err(Thrown::type_error("Cannot assign to the exposed object itself"));
                };
                let parent = object::resolve(root, parents)?;
                object::assign(&parent, name, value)?;
                Ok(Value::from(true))
            }
            Request::Apply { path, argument_list, .. } => {
                let args = self.codec.decode_args(argument_list, &mut transfers)?;
                let (parent, target) = object::resolve_with_parent(root, &path)?;
                object::invoke(&target, parent, args).await
            }
            Request::Construct { path, argument_list, .. } => {
                let args = self.codec.decode_args(argument_list, &mut transfers)?;
                let target = object::resolve(root, &path)?;
                Ok(by_reference(object::instantiate(&target, args).await?))
            }
            Request::Endpoint { .. } => {
                let (theirs, ours) = MessageChannel::new().into_ports();
                Exposer::from_arc(self.root.clone())
                    .with_codec(self.codec.clone())
                    .expose(ours);
                Ok(transfer(Value::Port(theirs.clone()), vec![theirs]))
            }
            Request::Release { .. } | Request::Unknown => Ok(Value::null()),
        }
    }

    /// Send exactly one response for `id`
    fn reply(&self, id: Uuid, outcome: Value) {
        let (wire, ports) = match self.codec.encode(outcome) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(%id, "result could not be encoded: {}", e);
                (clone_failure(&e), Vec::new())
            }
        };

        match self.post(id, wire, ports) {
            Ok(()) => {}
            Err(e @ ProxyError::Protocol(ProtocolError::TransferUnsupported))
            | Err(e @ ProxyError::Protocol(ProtocolError::FrameTooLarge { .. }))
            | Err(e @ ProxyError::DataClone(_)) => {
                warn!(%id, "result could not be sent: {}", e);
                if let Err(e) = self.post(id, clone_failure(&e), Vec::new()) {
                    error!(%id, "failed to send failure reply: {}", e);
                }
            }
            Err(e) => error!(%id, "failed to send reply: {}", e),
        }
    }

    fn post(&self, id: Uuid, wire: WireValue, ports: Vec<Port>) -> Result<()> {
        self.endpoint
            .post_message(Message::response(Response::new(id, wire)), ports)
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listener) = self.listener.get() {
            self.endpoint.remove_listener(*listener);
        }
        self.endpoint.close();
        debug!("exposure released");
    }
}

/// Mark a constructed instance exposable. Object-shaped data becomes a
/// record so the caller can reach it through its proxy.
fn by_reference(instance: Value) -> Value {
    match instance {
        Value::Object(instance) | Value::Handle(instance) => Value::Handle(instance),
        Value::Data(data @ serde_json::Value::Object(_)) => match Record::from_json(data) {
            Value::Object(record) => Value::Handle(record),
            other => other,
        },
        other => other,
    }
}

/// Failure reply for a result that could not be sent
fn clone_failure(err: &ProxyError) -> WireValue {
    let thrown = Thrown::named("DataCloneError", err.to_string());
    WireValue::handler(THROW_HANDLER, thrown.to_wire())
}
