//! # Event Publisher
//!
//! Publishing side of the bus.

use crate::events::{ChainEvent, EventFilter};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Interface the chain actor publishes through.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event; returns the number of subscribers that can see it.
    async fn publish(&self, event: ChainEvent) -> usize;

    /// Total events published over the bus lifetime.
    fn events_published(&self) -> u64;
}

/// In-memory bus over `tokio::sync::broadcast`.
///
/// Single-process operation only; the out-of-scope network layer carries
/// events between nodes.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ChainEvent>,
    events_published: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "new bus subscription");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Convenience stream wrapper over `subscribe`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.subscribe(filter))
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: ChainEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        // send() only errors when no receiver exists; that is a valid state
        // for a node without observers.
        self.sender.send(event).unwrap_or(0)
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
