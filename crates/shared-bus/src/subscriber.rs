//! # Event Subscriber
//!
//! Subscription handle and stream wrapper.

use crate::events::{ChainEvent, EventFilter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("event bus closed")]
    Closed,
}

/// A filtered receiver over the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<ChainEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ChainEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Next matching event, or `None` once the bus is gone. A lagged
    /// receiver skips the dropped prefix and keeps going.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "subscriber lagged, events dropped");
                    continue;
                }
            };
            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Result<Option<ChainEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };
            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

/// `Stream` adapter used by the ingress `subscribe_events` operation.
pub struct EventStream {
    subscription: Subscription,
}

impl EventStream {
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }
}

impl Stream for EventStream {
    type Item = ChainEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let future = self.subscription.recv();
        tokio::pin!(future);
        future.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::{EventPublisher, InMemoryEventBus};
    use shared_types::ContractState;

    #[tokio::test]
    async fn test_filter_skips_other_topics() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::for_topics(vec![EventTopic::Contracts]));

        bus.publish(ChainEvent::BlockAppended {
            height: 1,
            block_hash: [0u8; 32],
            tx_count: 0,
            miner: [0u8; 23],
        })
        .await;
        bus.publish(ChainEvent::ContractStateChanged {
            contract_id: [1u8; 32],
            from: ContractState::Open,
            to: ContractState::Accepted,
            block_hash: [0u8; 32],
        })
        .await;

        let event = sub.recv().await.unwrap();
        assert!(matches!(event, ChainEvent::ContractStateChanged { .. }));
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(matches!(sub.try_recv(), Ok(None)));
    }
}
