//! In-process message channels with transferable ports

use crate::endpoint::{Endpoint, Envelope, Listener, ListenerId, ListenerSet};
use crate::{ProxyError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tether_proto::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

/// A pair of entangled ports; whatever is posted on one arrives at the other
pub struct MessageChannel {
    /// First end
    pub port1: Port,
    /// Second end
    pub port2: Port,
}

impl MessageChannel {
    /// Create a fresh channel
    pub fn new() -> Self {
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();

        Self {
            port1: Port::new(tx2, rx1),
            port2: Port::new(tx1, rx2),
        }
    }

    /// Split into both ends
    pub fn into_ports(self) -> (Port, Port) {
        (self.port1, self.port2)
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// One end of a [`MessageChannel`].
///
/// Inbound messages are queued until [`Endpoint::start`]; delivery then runs
/// on a tokio task, so `start` must be called from within a runtime.
/// Cloning yields another handle to the same end.
#[derive(Clone)]
pub struct Port {
    inner: Arc<PortInner>,
}

struct PortInner {
    id: Uuid,
    outbox: mpsc::UnboundedSender<Envelope>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    listeners: Arc<ListenerSet>,
    closed: Arc<AtomicBool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Port {
    fn new(outbox: mpsc::UnboundedSender<Envelope>, inbox: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self {
            inner: Arc::new(PortInner {
                id: Uuid::new_v4(),
                outbox,
                inbox: Mutex::new(Some(inbox)),
                listeners: Arc::new(ListenerSet::new()),
                closed: Arc::new(AtomicBool::new(false)),
                pump: Mutex::new(None),
            }),
        }
    }

    /// Identifier used to reference this port on the wire
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether the port was closed, locally or by its peer going away
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether delivery has begun
    pub fn is_started(&self) -> bool {
        self.inner
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Endpoint for Port {
    fn post_message(&self, message: Message, transfer: Vec<Port>) -> Result<()> {
        if self.is_closed() {
            return Err(ProxyError::EndpointClosed);
        }
        trace!(port = %self.id(), ports = transfer.len(), "posting message");

        self.inner
            .outbox
            .send(Envelope { message, transfer })
            .map_err(|_| ProxyError::EndpointClosed)
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    fn start(&self) {
        if self.is_closed() {
            return;
        }
        let Some(mut inbox) = self
            .inner
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let id = self.id();
        let listeners = self.inner.listeners.clone();
        let closed = self.inner.closed.clone();

        let pump = tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                listeners.dispatch(envelope);
            }
            // Every handle to the peer is gone; nothing can arrive any more
            debug!(port = %id, "peer port dropped");
            closed.store(true, Ordering::Release);
            listeners.clear();
        });

        *self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(port = %self.id(), "closing port");

        if let Some(pump) = self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        self.inner.inbox.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.inner.listeners.clear();
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Port {}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_proto::Request;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::timeout;

    fn forward_to(port: &Port) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = unbounded_channel();
        port.add_listener(Arc::new(move |envelope: Envelope| {
            let _ = tx.send(envelope);
        }));
        rx
    }

    fn get(name: &str) -> Message {
        Message::request(Request::get(vec![name.into()]))
    }

    #[tokio::test]
    async fn test_messages_queue_until_start() {
        let (a, b) = MessageChannel::new().into_ports();
        let mut received = forward_to(&b);

        a.post_message(get("first"), vec![]).unwrap();
        a.post_message(get("second"), vec![]).unwrap();
        tokio::task::yield_now().await;
        assert!(received.try_recv().is_err());

        b.start();
        let first = received.recv().await.unwrap();
        let second = received.recv().await.unwrap();
        assert_eq!(
            [first.message, second.message]
                .iter()
                .map(|m| match m {
                    Message::Request(r) => r.path().to_vec(),
                    Message::Response(_) => vec![],
                })
                .collect::<Vec<_>>(),
            vec![vec!["first".to_string()], vec!["second".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_ports_move_with_messages() {
        let (a, b) = MessageChannel::new().into_ports();
        let (inner_a, inner_b) = MessageChannel::new().into_ports();
        let mut received = forward_to(&b);
        b.start();

        a.post_message(get("x"), vec![inner_b.clone()]).unwrap();
        let envelope = received.recv().await.unwrap();
        assert_eq!(envelope.transfer, vec![inner_b]);

        // The moved port still talks to its sibling
        let moved = envelope.transfer[0].clone();
        let mut moved_rx = forward_to(&moved);
        moved.start();
        inner_a.post_message(get("y"), vec![]).unwrap();
        assert!(moved_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_close_stops_delivery_and_posting() {
        let (a, b) = MessageChannel::new().into_ports();
        let mut received = forward_to(&b);
        b.start();

        b.close();
        assert!(b.is_closed());
        assert!(matches!(b.post_message(get("x"), vec![]), Err(ProxyError::EndpointClosed)));

        let _ = a.post_message(get("x"), vec![]);
        let nothing = timeout(Duration::from_millis(50), received.recv()).await;
        assert!(matches!(nothing, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn test_dropping_peer_closes_started_port() {
        let (a, b) = MessageChannel::new().into_ports();
        a.start();
        drop(b);

        timeout(Duration::from_secs(1), async {
            while !a.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
