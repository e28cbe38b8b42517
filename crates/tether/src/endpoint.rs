//! The endpoint abstraction messages travel over

use crate::channel::Port;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tether_proto::Message;

/// Identifies a registered listener so it can be removed later
pub type ListenerId = u64;

/// Callback invoked for every inbound message
pub type Listener = Arc<dyn Fn(Envelope) + Send + Sync>;

/// A message together with the ports that moved with it
#[derive(Debug, Clone)]
pub struct Envelope {
    /// The decoded message
    pub message: Message,
    /// Ports transferred alongside the message
    pub transfer: Vec<Port>,
}

impl Envelope {
    /// Envelope with no transferred ports
    pub fn new(message: Message) -> Self {
        Self {
            message,
            transfer: Vec::new(),
        }
    }
}

/// Bidirectional message channel.
///
/// Inbound messages may be buffered until [`Endpoint::start`] is called.
/// Channels that cannot move ports reject a non-empty transfer list.
pub trait Endpoint: Send + Sync {
    /// Send a message, moving `transfer` to the other side
    fn post_message(&self, message: Message, transfer: Vec<Port>) -> Result<()>;

    /// Register a listener for inbound messages
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Remove a previously registered listener
    fn remove_listener(&self, id: ListenerId);

    /// Begin delivering inbound messages
    fn start(&self) {}

    /// Stop the channel
    fn close(&self) {}
}

/// Listener registry shared by endpoint implementations
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl ListenerSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an envelope to every listener in registration order.
    ///
    /// Listeners run against a snapshot, so they may add or remove
    /// listeners (including themselves) while being called.
    pub fn dispatch(&self, envelope: Envelope) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(envelope.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tether_proto::Request;

    fn envelope() -> Envelope {
        Envelope::new(Message::request(Request::get(vec!["x".into()])))
    }

    #[test]
    fn test_dispatch_reaches_every_listener() {
        let set = ListenerSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = seen.clone();
            set.add(Arc::new(move |_: Envelope| seen.lock().unwrap().push(tag)));
        }
        set.dispatch(envelope());

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_listener() {
        let set = ListenerSet::new();
        let id = set.add(Arc::new(|_: Envelope| panic!("removed listener was called")));

        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());
        set.dispatch(envelope());
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let set = Arc::new(ListenerSet::new());
        let calls = Arc::new(Mutex::new(0));
        let slot = Arc::new(Mutex::new(None));

        let id = {
            let set_ref = set.clone();
            let calls = calls.clone();
            let slot = slot.clone();
            set.add(Arc::new(move |_: Envelope| {
                *calls.lock().unwrap() += 1;
                if let Some(id) = *slot.lock().unwrap() {
                    set_ref.remove(id);
                }
            }))
        };
        *slot.lock().unwrap() = Some(id);

        set.dispatch(envelope());
        set.dispatch(envelope());

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
