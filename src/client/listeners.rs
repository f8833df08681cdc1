//! Listener registry and frame dispatch.
//!
//! Every inbound envelope is tested, in listener-registration order,
//! against every active listener's shape. A request in flight is two
//! one-shot listeners racing each other (success path, error path);
//! subscriptions are the same machinery with a stream sink and, usually,
//! the continuous flag.
//!
//! A listener whose receiving end is gone delivers nothing on its next
//! match and is swept from the registry at that point. This is what makes
//! a late response to an already timed-out request a no-op.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;
use uuid::Uuid;

use crate::protocol::{Packet, Shape};

// ============================================================================
// ListenerId
// ============================================================================

/// Opaque handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Generates a fresh id.
    #[inline]
    #[must_use]
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Outcome of testing one frame against one listener.
pub(crate) enum Delivery {
    /// Shape did not match; the listener stays.
    NoMatch,
    /// Matched and delivered; a continuous listener stays.
    Delivered,
    /// Matched and delivered; a one-shot listener is finished.
    Done,
    /// Matched but the receiver is gone; sweep the listener.
    Lapsed,
}

/// A type-erased listener: shape test plus delivery in one closure.
pub(crate) type ListenerFn = Box<dyn FnMut(&Packet) -> Delivery + Send>;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Insertion-ordered set of active listeners.
pub(crate) struct ListenerRegistry {
    entries: Mutex<Vec<(ListenerId, ListenerFn)>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener at the end of the dispatch order.
    pub fn insert(&self, listener: ListenerFn) -> ListenerId {
        let id = ListenerId::generate();
        self.entries.lock().push((id, listener));
        id
    }

    /// Removes a listener by id.
    ///
    /// Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Returns the number of active listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Tests one frame against every active listener, in order.
    ///
    /// Returns the number of deliveries.
    pub fn dispatch(&self, packet: &Packet) -> usize {
        let mut delivered = 0;

        let mut entries = self.entries.lock();
        entries.retain_mut(|(id, listener)| match listener(packet) {
            Delivery::NoMatch => true,
            Delivery::Delivered => {
                delivered += 1;
                true
            }
            Delivery::Done => {
                delivered += 1;
                trace!(listener = %id, "one-shot listener finished");
                false
            }
            Delivery::Lapsed => {
                trace!(listener = %id, "listener receiver gone, sweeping");
                false
            }
        });

        delivered
    }
}

// ============================================================================
// ListenerRegistry - Typed Registration
// ============================================================================

impl ListenerRegistry {
    /// Registers a one-shot listener for a shape.
    ///
    /// The receiver resolves with the first matching frame; the listener
    /// deregisters itself at that point.
    pub fn register_once<T: Send + 'static>(
        &self,
        shape: Shape<T>,
    ) -> (ListenerId, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);

        let id = self.insert(Box::new(move |packet| {
            let Some(value) = shape.matches(packet) else {
                return Delivery::NoMatch;
            };
            match tx.take() {
                Some(sender) => match sender.send(value) {
                    Ok(()) => Delivery::Done,
                    Err(_) => Delivery::Lapsed,
                },
                None => Delivery::Lapsed,
            }
        }));

        (id, rx)
    }

    /// Registers a continuous listener for a shape.
    ///
    /// The receiver yields every matching frame until it is dropped.
    pub fn register_stream<T: Send + 'static>(
        &self,
        shape: Shape<T>,
    ) -> (ListenerId, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let id = self.insert(Box::new(move |packet| {
            let Some(value) = shape.matches(packet) else {
                return Delivery::NoMatch;
            };
            match tx.send(value) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Lapsed,
            }
        }));

        (id, rx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn ulist(val: &str) -> Packet {
        Packet::new("ulist", val)
    }

    #[test]
    fn test_dispatch_is_in_registration_order() {
        let registry = ListenerRegistry::new();
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = std::sync::Arc::clone(&log);
            registry.insert(Box::new(move |_| {
                log.lock().push(name);
                Delivery::Delivered
            }));
        }

        registry.dispatch(&ulist(";"));
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_one_shot_listener_fires_once() {
        let registry = ListenerRegistry::new();
        let (_id, mut rx) = registry.register_once(crate::protocol::ulist_shape());

        assert_eq!(registry.dispatch(&ulist("alice;")), 1);
        assert_eq!(registry.len(), 0);

        // A second matching frame has nobody left to hear it.
        assert_eq!(registry.dispatch(&ulist("bob;")), 0);
        assert_eq!(rx.try_recv().expect("value"), vec!["alice".to_string()]);
    }

    #[test]
    fn test_continuous_listener_keeps_firing() {
        let registry = ListenerRegistry::new();
        let (_id, mut rx) = registry.register_stream(crate::protocol::ulist_shape());

        registry.dispatch(&ulist("alice;"));
        registry.dispatch(&ulist("bob;"));

        assert_eq!(rx.try_recv().expect("first"), vec!["alice".to_string()]);
        assert_eq!(rx.try_recv().expect("second"), vec!["bob".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_non_matching_frames_are_ignored() {
        let registry = ListenerRegistry::new();
        let (_id, mut rx) = registry.register_once(crate::protocol::ulist_shape());

        assert_eq!(
            registry.dispatch(&Packet::new("statuscode", "I:100 | OK")),
            0
        );
        assert_eq!(registry.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_swept_on_next_match() {
        let registry = ListenerRegistry::new();
        let (_id, rx) = registry.register_once(crate::protocol::ulist_shape());
        drop(rx);

        // Still registered: the sweep is lazy.
        assert_eq!(registry.len(), 1);

        // Non-matching traffic leaves it alone.
        registry.dispatch(&Packet::new("direct", json!({})));
        assert_eq!(registry.len(), 1);

        // The next matching frame delivers nothing and sweeps it.
        assert_eq!(registry.dispatch(&ulist("alice;")), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_by_id() {
        let registry = ListenerRegistry::new();
        let (id, _rx) = registry.register_once(crate::protocol::ulist_shape());

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_frame_matching_two_listeners_reaches_both() {
        let registry = ListenerRegistry::new();
        let (_a, mut rx_a) = registry.register_stream(crate::protocol::ulist_shape());
        let (_b, mut rx_b) = registry.register_once(crate::protocol::ulist_shape());

        assert_eq!(registry.dispatch(&ulist("alice;")), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}
