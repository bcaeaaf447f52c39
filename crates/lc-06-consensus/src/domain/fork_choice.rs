//! Fork choice.
//!
//! Best chain: greatest cumulative work, ties broken by greatest
//! BFT-finalized height, then lowest tip hash. Competing forks deeper than
//! the reorg window are refused and recorded as suspect.

use crate::errors::ConsensusError;
use primitive_types::U256;
use shared_types::Hash;
use std::cmp::Ordering;

/// Everything fork choice needs to know about a tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TipInfo {
    pub hash: Hash,
    pub height: u64,
    pub cumulative_work: U256,
    /// Highest height with observed BFT finality on this branch.
    pub finalized_height: u64,
}

/// `Ordering::Greater` when `candidate` should replace `current`.
pub fn better_tip(candidate: &TipInfo, current: &TipInfo) -> Ordering {
    candidate
        .cumulative_work
        .cmp(&current.cumulative_work)
        .then(candidate.finalized_height.cmp(&current.finalized_height))
        // Lowest hash wins the final tie, so invert the byte order.
        .then_with(|| current.hash.cmp(&candidate.hash))
}

/// Guard a prospective reorg: the fork point may not be deeper than the
/// window below the current tip.
pub fn check_reorg_depth(
    current_height: u64,
    fork_height: u64,
    window: u64,
) -> Result<u64, ConsensusError> {
    let depth = current_height.saturating_sub(fork_height);
    if depth > window {
        return Err(ConsensusError::ReorgBeyondWindow { depth, window });
    }
    Ok(depth)
}
