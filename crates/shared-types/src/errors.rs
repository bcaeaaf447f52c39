//! Core error taxonomy.
//!
//! Every subsystem surfaces its failures through this tagged union at the
//! runtime boundary. Structured context (hashes, heights, validator ids)
//! travels in the variant fields; no stack traces cross the API boundary.

use crate::entities::{Hash, ValidatorId};
use thiserror::Error;

/// The error union surfaced by every core operation.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CoreError {
    // --- Transaction validation ---------------------------------------------
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: u64, actual: u64 },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("duplicate transaction")]
    DuplicateTransaction { tx_hash: Hash },

    // --- Block validation ---------------------------------------------------
    #[error("invalid block structure: {reason}")]
    InvalidBlockStructure { reason: String },

    #[error("proof-of-work target missed: {got} leading zero bits, need {need}")]
    PoWTargetMissed { got: u32, need: u32 },

    #[error("merkle root mismatch")]
    MerkleMismatch { block_hash: Hash },

    #[error("unknown parent block")]
    ParentUnknown { parent_hash: Hash },

    #[error("timestamp drift: {delta_s:.1}s beyond tolerance")]
    TimestampDrift { delta_s: f64 },

    #[error("block too large: {size} bytes, cap {cap}")]
    BlockTooLarge { size: usize, cap: usize },

    // --- Consensus ----------------------------------------------------------
    #[error("quorum insufficient: {got} of {need} attestations")]
    QuorumInsufficient { got: usize, need: usize },

    #[error("view change timed out at view {view}")]
    ViewChangeTimeout { view: u64 },

    #[error("proposer misbehavior by validator")]
    ProposerMisbehavior { validator: ValidatorId },

    // --- Contracts / PoD ----------------------------------------------------
    #[error("illegal contract state transition: {from} -> {to}")]
    ContractStateIllegalTransition { from: String, to: String },

    #[error("checkpoint out of tolerance: {distance_m:.0}m from envelope")]
    CheckpointOutOfTolerance { distance_m: f64 },

    #[error("checkpoint out of order: expected seq {expected}, got {actual}")]
    CheckpointOutOfOrder { expected: u32, actual: u32 },

    #[error("contract expired")]
    ContractExpired { contract_id: Hash },

    // --- Rate / replay ------------------------------------------------------
    #[error("coordinate cell saturated at ({lat}, {lng})")]
    CoordinateSaturated { lat: i16, lng: i16 },

    #[error("rate limited")]
    RateLimited,

    #[error("replay detected")]
    ReplayDetected { tx_hash: Hash },

    // --- Persistence --------------------------------------------------------
    #[error("persistence I/O error: {detail}")]
    PersistenceIoError { detail: String },

    #[error("index corruption: {detail}")]
    IndexCorruption { detail: String },

    #[error("reorg beyond window: depth {depth}, window {window}")]
    ReorgBeyondWindow { depth: u64, window: u64 },

    // --- Resource / lifecycle -----------------------------------------------
    #[error("resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    #[error("cancelled")]
    Cancelled,

    #[error("timed out: {operation}")]
    Timeout { operation: String },
}

impl CoreError {
    /// True for failures that reject the submission but leave the core
    /// healthy (the peer is scored down and processing continues).
    pub fn is_local_rejection(&self) -> bool {
        !matches!(
            self,
            CoreError::PersistenceIoError { .. }
                | CoreError::IndexCorruption { .. }
                | CoreError::ResourceExhausted { .. }
        )
    }
}
