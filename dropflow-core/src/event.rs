//! Drop status events.
//!
//! Every status transition of a drop is published on its session's
//! [`EventBus`]. Listeners registered for a specific oid (or for all drops)
//! are called synchronously on the publishing thread, after the drop has
//! released its own lock. Async observers can subscribe to a broadcast
//! stream instead.

use crate::types::{DropStatus, Oid, SessionId, Uid};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the broadcast stream; slow subscribers see `Lagged`.
const BROADCAST_CAPACITY: usize = 1024;

/// A drop changed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropEvent {
    /// Session the drop belongs to.
    pub session_id: SessionId,
    /// Drop object id.
    pub oid: Oid,
    /// Drop instance id.
    pub uid: Uid,
    /// Status after the transition.
    pub status: DropStatus,
}

/// Receives drop events.
pub trait DropEventListener: Send + Sync {
    /// Called once per published event the listener is registered for.
    fn on_event(&self, event: &DropEvent);
}

impl<F> DropEventListener for F
where
    F: Fn(&DropEvent) + Send + Sync,
{
    fn on_event(&self, event: &DropEvent) {
        self(event)
    }
}

/// Per-session publish/subscribe hub for drop events.
pub struct EventBus {
    by_oid: RwLock<HashMap<Oid, Vec<Arc<dyn DropEventListener>>>>,
    all: RwLock<Vec<Arc<dyn DropEventListener>>>,
    stream: broadcast::Sender<DropEvent>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            by_oid: RwLock::new(HashMap::new()),
            all: RwLock::new(Vec::new()),
            stream,
        }
    }

    /// Listen to events of one drop.
    pub fn subscribe(&self, oid: impl Into<Oid>, listener: Arc<dyn DropEventListener>) {
        self.by_oid
            .write()
            .entry(oid.into())
            .or_default()
            .push(listener);
    }

    /// Listen to events of every drop.
    pub fn subscribe_all(&self, listener: Arc<dyn DropEventListener>) {
        self.all.write().push(listener);
    }

    /// Async stream of every event published after this call.
    pub fn stream(&self) -> broadcast::Receiver<DropEvent> {
        self.stream.subscribe()
    }

    /// Number of listeners registered for `oid`, not counting global ones.
    pub fn listener_count(&self, oid: &str) -> usize {
        self.by_oid.read().get(oid).map_or(0, Vec::len)
    }

    /// Deliver an event to its listeners.
    pub fn publish(&self, event: &DropEvent) {
        // Clone out of the locks so listeners may subscribe re-entrantly.
        let mut listeners: Vec<Arc<dyn DropEventListener>> = self.all.read().clone();
        if let Some(specific) = self.by_oid.read().get(&event.oid) {
            listeners.extend(specific.iter().cloned());
        }
        for listener in listeners {
            listener.on_event(event);
        }
        // No receivers is fine.
        let _ = self.stream.send(event.clone());
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.by_oid.write().clear();
        self.all.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("drops_with_listeners", &self.by_oid.read().len())
            .field("global_listeners", &self.all.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn event(oid: &str, status: DropStatus) -> DropEvent {
        DropEvent {
            session_id: SessionId::new("s"),
            oid: Oid::new(oid),
            uid: Uid::new(oid),
            status,
        }
    }

    #[test]
    fn listeners_only_see_their_drop() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            "A",
            Arc::new(move |e: &DropEvent| sink.lock().push(e.status)),
        );

        bus.publish(&event("A", DropStatus::Writing));
        bus.publish(&event("B", DropStatus::Completed));
        bus.publish(&event("A", DropStatus::Completed));

        assert_eq!(
            *seen.lock(),
            vec![DropStatus::Writing, DropStatus::Completed]
        );
    }

    #[test]
    fn global_listeners_see_everything() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        bus.subscribe_all(Arc::new(move |_: &DropEvent| *sink.lock() += 1));
        bus.publish(&event("A", DropStatus::Completed));
        bus.publish(&event("B", DropStatus::Error));
        assert_eq!(*count.lock(), 2);
    }

    #[tokio::test]
    async fn stream_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.stream();
        bus.publish(&event("A", DropStatus::Completed));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.oid.as_str(), "A");
    }

    #[test]
    fn event_wire_format_is_camel_case() {
        let json = serde_json::to_value(event("A", DropStatus::Completed)).unwrap();
        assert_eq!(json["sessionId"], "s");
        assert_eq!(json["status"], "COMPLETED");
    }
}
