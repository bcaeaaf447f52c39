//! Gossip egress seam.
//!
//! The core does not speak to the network; it hands signed envelopes to the
//! out-of-scope network layer through a bounded outbox. Backpressure drops
//! the oldest queued message, never the newest.

use parking_lot::Mutex;
use shared_crypto::gossip_message_id;
use shared_crypto::signatures::Ed25519Keypair;
use shared_types::codec::{encode_block, encode_transaction, gossip_id_bytes};
use shared_types::{Block, GossipMessage, GossipType, Transaction, GOSSIP_TTL};
use std::collections::VecDeque;
use tracing::debug;

/// Default outbox depth.
pub const OUTBOX_DEPTH: usize = 4096;

/// Signs and queues outbound gossip.
pub struct GossipOutbox {
    node_key: Ed25519Keypair,
    queue: Mutex<VecDeque<GossipMessage>>,
    depth: usize,
}

impl GossipOutbox {
    pub fn new(node_key: Ed25519Keypair) -> Self {
        Self::with_depth(node_key, OUTBOX_DEPTH)
    }

    pub fn with_depth(node_key: Ed25519Keypair, depth: usize) -> Self {
        Self {
            node_key,
            queue: Mutex::new(VecDeque::with_capacity(depth.min(1024))),
            depth,
        }
    }

    pub fn node_id(&self) -> [u8; 32] {
        self.node_key.public_key()
    }

    /// Build, sign and enqueue one envelope.
    pub fn push(&self, msg_type: GossipType, payload: Vec<u8>, now: f64) -> GossipMessage {
        let mut message = GossipMessage {
            msg_type,
            payload,
            node_id: self.node_id(),
            timestamp: now,
            message_id: [0u8; 32],
            ttl: GOSSIP_TTL,
            signature: [0u8; 64],
        };
        message.message_id = gossip_message_id(&message);
        message.signature = self.node_key.sign(&gossip_id_bytes(&message));

        let mut queue = self.queue.lock();
        if queue.len() >= self.depth {
            // Gossip backpressure: oldest first out.
            queue.pop_front();
            debug!("gossip outbox full, dropped oldest");
        }
        queue.push_back(message.clone());
        message
    }

    pub fn announce_block(&self, block: &Block, now: f64) -> GossipMessage {
        self.push(GossipType::Block, encode_block(block), now)
    }

    pub fn announce_transaction(&self, tx: &Transaction, now: f64) -> GossipMessage {
        self.push(GossipType::Transaction, encode_transaction(tx), now)
    }

    pub fn request_sync(&self, from_height: u64, to_height: u64, now: f64) -> GossipMessage {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&from_height.to_le_bytes());
        payload.extend_from_slice(&to_height.to_le_bytes());
        self.push(GossipType::SyncRequest, payload, now)
    }

    /// Drain everything queued; called by the network layer's send loop.
    pub fn drain(&self) -> Vec<GossipMessage> {
        self.queue.lock().drain(..).collect()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}
