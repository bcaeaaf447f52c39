//! Contract error types.

use shared_types::{ContractState, Hash};
use thiserror::Error;

/// Failures from contract operations and checkpoint validation.
///
/// Checkpoint rules run in a fixed order; the variant reports the first rule
/// that failed.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ContractError {
    #[error("unknown contract")]
    UnknownContract { contract_id: Hash },

    #[error("contract already exists")]
    DuplicateContract { contract_id: Hash },

    #[error("illegal state transition: {from:?} -> {to:?}")]
    IllegalTransition {
        from: ContractState,
        to: ContractState,
    },

    #[error("driver reputation {reputation:.2} below threshold {threshold:.2}")]
    ReputationTooLow { reputation: f64, threshold: f64 },

    #[error("operation not signed by the assigned driver")]
    NotTheDriver,

    #[error("invalid checkpoint signature")]
    BadCheckpointSignature,

    #[error("checkpoint out of order: expected seq {expected}, got {actual}")]
    CheckpointOutOfOrder { expected: u32, actual: u32 },

    #[error("checkpoint chain broken at seq {seq}")]
    CheckpointChainBroken { seq: u32 },

    #[error("checkpoint timestamp drift {delta_s:.0}s beyond tolerance")]
    CheckpointTimestampDrift { delta_s: f64 },

    #[error("GPS accuracy {accuracy_m:.1}m above limit {limit_m:.1}m")]
    AccuracyTooLow { accuracy_m: f64, limit_m: f64 },

    #[error("step of {step_km:.2}km exceeds maximum {max_km:.2}km")]
    StepTooLong { step_km: f64, max_km: f64 },

    #[error("checkpoint {distance_m:.0}m outside the delivery envelope")]
    CheckpointOutOfTolerance { distance_m: f64 },

    #[error("terminal accuracy {accuracy_m:.1}m exceeds contract max error {max_error_m:.1}m")]
    TerminalAccuracyTooLow { accuracy_m: f64, max_error_m: f64 },

    #[error("contract expired")]
    Expired { contract_id: Hash },

    #[error("invalid coordinates in contract definition")]
    InvalidCoordinates,

    #[error("malformed payload: {detail}")]
    MalformedPayload { detail: String },
}
