//! Event bus and subscription handles.
//!
//! The source attaches/detaches listeners by function identity against the
//! host's any-handler bus API. This crate instead gives `subscribe` an
//! explicit `Subscription` handle that `unsubscribe` consumes (§9 design
//! note), backed by `tokio::sync::broadcast` so the crate is runnable
//! standalone in tests without a real host event bus.

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// One event observed on the bus: a name and an opaque JSON payload.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub name: String,
    pub payload: Value,
}

/// A host event bus instance. Cloneable and cheap — clones share the same
/// underlying broadcast channel, matching "rebind to a new event-bus
/// instance" semantics where each instance is a distinct channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
    /// Identity marker. Clones of the same `EventBus` share this `Arc`, so
    /// `Connect(bus); Connect(bus)` with the same instance can be detected
    /// and deduplicated (§8 idempotence property) without relying on any
    /// equality the underlying channel doesn't provide.
    id: std::sync::Arc<()>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(1024);
        Self {
            sender,
            id: std::sync::Arc::new(()),
        }
    }

    /// Stable identity for this bus instance, shared by all its clones.
    pub fn id(&self) -> usize {
        std::sync::Arc::as_ptr(&self.id) as usize
    }

    /// Publish an event. Producers outside the shipper (the host's own event
    /// bus traffic) call this; lagging or absent subscribers never block the
    /// publisher.
    pub fn publish(&self, name: impl Into<String>, payload: Value) {
        let _ = self.sender.send(BusEvent {
            name: name.into(),
            payload,
        });
    }

    pub(crate) fn receiver(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to an [`EventBus`]. Dropping this without calling
/// `unsubscribe` also stops delivery (the backing task is aborted either
/// way), but `unsubscribe` is the explicit, spec-named operation.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Detach from the bus. Safe to call on an already-aborted subscription.
    pub fn unsubscribe(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
