//! Request/response correlation over an endpoint

use crate::channel::Port;
use crate::endpoint::{Endpoint, Envelope, ListenerId};
use crate::{ProxyError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tether_proto::{Message, ProtocolError, Request};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};
use uuid::Uuid;

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Envelope>>>>;

/// Matches responses to outstanding requests by id.
///
/// A single listener on the endpoint routes every response to the waiter
/// registered under its id; responses nobody waits for are dropped.
pub struct Correlator {
    endpoint: Arc<dyn Endpoint>,
    pending: Pending,
    listener: ListenerId,
}

impl Correlator {
    /// Attach to `endpoint`
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        let pending: Pending = Arc::default();
        let table = pending.clone();

        let listener = endpoint.add_listener(Arc::new(move |envelope: Envelope| {
            let Message::Response(response) = &envelope.message else {
                return;
            };
            let id = response.id;
            let waiter = table.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
            match waiter {
                Some(tx) => {
                    if tx.send(envelope).is_err() {
                        debug!(%id, "waiter gave up before its response arrived");
                    }
                }
                None => trace!(%id, "ignoring response with no waiter"),
            }
        }));

        Self {
            endpoint,
            pending,
            listener,
        }
    }

    /// The endpoint requests are sent over
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// Number of requests still waiting for a response
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Send `request` and wait for the response carrying its id.
    ///
    /// The waiter is registered and the endpoint started before the request
    /// is posted. Without a timeout the wait is unbounded: if the peer never
    /// answers, the entry stays in the table until the correlator is dropped.
    pub async fn request(
        &self,
        request: Request,
        transfer: Vec<Port>,
        wait: Option<Duration>,
    ) -> Result<Envelope> {
        let id = request.id().ok_or_else(|| {
            ProxyError::Protocol(ProtocolError::Serialization(
                "Request has no correlation id".to_string(),
            ))
        })?;

        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);
        self.endpoint.start();

        debug!(%id, kind = request.kind(), path = ?request.path(), "sending request");
        if let Err(e) = self.endpoint.post_message(Message::request(request), transfer) {
            self.lock_pending().remove(&id);
            return Err(e);
        }

        let reply = match wait {
            Some(duration) => match timeout(duration, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.lock_pending().remove(&id);
                    return Err(ProxyError::Timeout { duration });
                }
            },
            None => rx.await,
        };

        reply.map_err(|_| ProxyError::EndpointClosed)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, oneshot::Sender<Envelope>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Correlator {
    fn drop(&mut self) {
        self.endpoint.remove_listener(self.listener);
    }
}
