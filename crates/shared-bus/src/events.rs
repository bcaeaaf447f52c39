//! # Chain Events
//!
//! Everything the core announces on the bus. These are also the payloads of
//! the `subscribe_events` ingress stream.

use serde::{Deserialize, Serialize};
use shared_types::{Address, ContractState, Hash};

/// Events published by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A block was validated and appended to the best chain.
    BlockAppended {
        height: u64,
        block_hash: Hash,
        tx_count: usize,
        miner: Address,
    },

    /// The best chain switched to a competing tip.
    Reorg {
        common_ancestor: Hash,
        old_tip: Hash,
        new_tip: Hash,
        depth: u64,
    },

    /// A contract moved to a new lifecycle state.
    ContractStateChanged {
        contract_id: Hash,
        from: ContractState,
        to: ContractState,
        block_hash: Hash,
    },

    /// A competing tip beyond the reorg window was observed and refused.
    SuspiciousFork {
        tip_hash: Hash,
        fork_height: u64,
        depth: u64,
    },

    /// Mempool evicted a bundle under capacity pressure.
    MempoolEvicted { tx_hashes: Vec<Hash> },

    /// Persistence failed twice; block application is halted and operator
    /// action is required.
    FatalPersistence { detail: String },
}

/// Coarse topic tags for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Blocks,
    Reorgs,
    Contracts,
    Mempool,
    Fatal,
}

impl ChainEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            ChainEvent::BlockAppended { .. } => EventTopic::Blocks,
            ChainEvent::Reorg { .. } | ChainEvent::SuspiciousFork { .. } => EventTopic::Reorgs,
            ChainEvent::ContractStateChanged { .. } => EventTopic::Contracts,
            ChainEvent::MempoolEvicted { .. } => EventTopic::Mempool,
            ChainEvent::FatalPersistence { .. } => EventTopic::Fatal,
        }
    }
}

/// Subscription filter. Empty topic set means everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Match every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}
