//! # Chain Digests
//!
//! The hash definitions that identify chain objects:
//!
//! - transaction hash: double SHA-256 of the unsigned wire encoding
//! - block hash: double SHA-256 of the proof-of-work header region
//! - checkpoint hash: single SHA-256 over the full checkpoint record
//! - gossip message id: single SHA-256 of the id region

use crate::hashing::{double_sha256, sha256};
use shared_types::codec;
use shared_types::{BlockHeader, Checkpoint, GossipMessage, Hash, Transaction};

/// Transaction id. Commits to every field except the signature, so a
/// signature malleation cannot change the id senders quote.
pub fn tx_hash(tx: &Transaction) -> Hash {
    double_sha256(&codec::tx_signing_bytes(tx))
}

/// Block id; the value the proof-of-work target is checked against and the
/// value validators attest to.
pub fn block_hash(header: &BlockHeader) -> Hash {
    double_sha256(&codec::header_pow_bytes(header))
}

/// Canonical bytes a driver signs for one checkpoint:
/// contract_id ‖ seq ‖ timestamp ‖ lat ‖ lng ‖ prev_checkpoint_hash.
pub fn checkpoint_signing_bytes(contract_id: &Hash, cp: &Checkpoint) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 4 + 8 + 8 + 8 + 32);
    out.extend_from_slice(contract_id);
    out.extend_from_slice(&cp.seq.to_le_bytes());
    out.extend_from_slice(&cp.timestamp.to_le_bytes());
    out.extend_from_slice(&cp.position.lat.to_le_bytes());
    out.extend_from_slice(&cp.position.lng.to_le_bytes());
    out.extend_from_slice(&cp.prev_hash);
    out
}

/// Hash of a full checkpoint record, committed to by the next checkpoint's
/// `prev_hash` (the tamper-evident chain inside a contract).
pub fn checkpoint_hash(contract_id: &Hash, cp: &Checkpoint) -> Hash {
    let mut bytes = checkpoint_signing_bytes(contract_id, cp);
    bytes.extend_from_slice(&cp.accuracy_m.to_le_bytes());
    bytes.extend_from_slice(&cp.signature);
    sha256(&bytes)
}

/// Gossip message id over (type ‖ payload ‖ node_id ‖ timestamp).
pub fn gossip_message_id(msg: &GossipMessage) -> Hash {
    sha256(&codec::gossip_id_bytes(msg))
}
