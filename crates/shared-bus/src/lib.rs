//! # Shared Bus - Chain Event Fan-out
//!
//! Append-only event log seam between the core actors and external
//! observers. The chain actor publishes; everything else subscribes.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Chain actor  │                    │ Subscribers  │
//! │              │    publish()       │ (ingress,    │
//! │              │ ──────┐            │  telemetry)  │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Backpressure follows the gossip rule: the broadcast channel is bounded and
//! a lagging subscriber observes drop-oldest, never a stalled publisher.

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ChainEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events buffered per subscriber before drop-oldest kicks in.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
