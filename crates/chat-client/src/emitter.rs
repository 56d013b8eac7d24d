//! Event fan-out
//!
//! Handlers registered with [`EventEmitter::on`] run synchronously, in
//! registration order, on the router task. Subscribers get a broadcast
//! receiver and may lag; a lagging subscriber loses the oldest events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::events::Event;

/// Broadcast buffer per subscriber
const BROADCAST_CAPACITY: usize = 1024;

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Delivers routed events to the application
pub struct EventEmitter {
    handlers: RwLock<Vec<Handler>>,
    broadcast: broadcast::Sender<Event>,
    emitted: AtomicU64,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    #[must_use]
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            handlers: RwLock::new(Vec::new()),
            broadcast,
            emitted: AtomicU64::new(0),
        }
    }

    /// Register a callback. It must not block.
    pub fn on<F>(&self, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Receive events on a channel
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.broadcast.subscribe()
    }

    /// Deliver one event to every handler, then to subscribers
    pub fn emit(&self, event: Event) {
        // Handlers may register more handlers
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            handler(&event);
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine
        let _ = self.broadcast.send(event);
    }

    /// Events emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}
