//! BFT protocol messages and their signing bytes.
//!
//! Each message signs a domain-separated tuple so a PREPARE can never be
//! replayed as a COMMIT.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_types::{Hash, Signature, ValidatorId};

/// Messages exchanged by committee members during a round.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BftMessage {
    /// The proposer announces a candidate for (view, height).
    PrePrepare {
        view: u64,
        height: u64,
        block_hash: Hash,
        proposer: ValidatorId,
        #[serde_as(as = "Bytes")]
        signature: Signature,
    },
    /// A member saw a valid proposal.
    Prepare {
        view: u64,
        height: u64,
        block_hash: Hash,
        validator: ValidatorId,
        #[serde_as(as = "Bytes")]
        signature: Signature,
    },
    /// A member saw a prepare quorum.
    Commit {
        view: u64,
        height: u64,
        block_hash: Hash,
        validator: ValidatorId,
        #[serde_as(as = "Bytes")]
        signature: Signature,
    },
    /// The proposer went silent; vote to move to `new_view`.
    ViewChange {
        new_view: u64,
        last_committed: u64,
        validator: ValidatorId,
        #[serde_as(as = "Bytes")]
        signature: Signature,
    },
}

pub fn pre_prepare_signing_bytes(view: u64, height: u64, block_hash: &Hash) -> Vec<u8> {
    signing_bytes(b"PRE-PREPARE", view, height, block_hash)
}

pub fn prepare_signing_bytes(view: u64, height: u64, block_hash: &Hash) -> Vec<u8> {
    signing_bytes(b"PREPARE", view, height, block_hash)
}

pub fn commit_signing_bytes(view: u64, height: u64, block_hash: &Hash) -> Vec<u8> {
    signing_bytes(b"COMMIT", view, height, block_hash)
}

pub fn view_change_signing_bytes(new_view: u64, last_committed: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(27);
    out.extend_from_slice(b"VIEW-CHANGE");
    out.extend_from_slice(&new_view.to_le_bytes());
    out.extend_from_slice(&last_committed.to_le_bytes());
    out
}

fn signing_bytes(tag: &[u8], view: u64, height: u64, block_hash: &Hash) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len() + 48);
    out.extend_from_slice(tag);
    out.extend_from_slice(&view.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(block_hash);
    out
}
