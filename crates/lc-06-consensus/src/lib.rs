//! # LC-06 Consensus - Hybrid Agreement
//!
//! Three gates decide whether a block becomes canonical:
//!
//! 1. **PoW**: the header hash clears the leading-zero-bit target
//!    (Sybil resistance, rate limiting).
//! 2. **PoD**: every contract transition inside the block is individually
//!    valid; one bad proof-of-delivery rejects the block wholesale.
//! 3. **BFT**: blocks finalizing contracts carry a ⌊2f⌋+1 quorum of
//!    committee attestations over the header hash (ON_GRID only).
//!
//! The committee is the top-N validators by stake, rotated at epoch
//! boundaries. Proposal liveness uses classical three-phase BFT with
//! round-robin proposers and doubling view-change timeouts.
//!
//! Fork choice: greatest cumulative work, then greatest finalized height,
//! then lowest tip hash; forks deeper than the reorg window are refused.

pub mod domain;
pub mod engine;
pub mod errors;

pub use domain::committee::{ValidatorInfo, ValidatorRegistry};
pub use domain::fork_choice::{better_tip, check_reorg_depth, TipInfo};
pub use domain::messages::{
    commit_signing_bytes, prepare_signing_bytes, view_change_signing_bytes, BftMessage,
};
pub use domain::view::{BftEvent, BftRound, Phase};
pub use engine::{HybridEngine, ReputationView};
pub use errors::ConsensusError;
