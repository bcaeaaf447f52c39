//! Checkpoint rule chain.
//!
//! Rules run in a fixed order and the first failure names the error:
//! signature, sequence, chain linkage, timestamp drift, GPS accuracy,
//! step length, envelope membership. Only then is the lifecycle outcome
//! decided.

use super::envelope::RouteEnvelope;
use super::errors::ContractError;
use lc_coordinate_grid::haversine_m;
use shared_crypto::{checkpoint_hash, checkpoint_signing_bytes, signatures};
use shared_types::{ChainConfig, Checkpoint, Contract, ContractState};

/// What a valid checkpoint did to the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// First checkpoint at the pickup: ACCEPTED → IN_TRANSIT.
    EnteredTransit,
    /// Intermediate waypoint: IN_TRANSIT → IN_TRANSIT.
    Progressed,
    /// Terminal checkpoint at the delivery: IN_TRANSIT → DELIVERED.
    Delivered,
}

/// Validate one checkpoint against a contract and decide its outcome.
///
/// `ingest_time` is the time the containing block is being applied at; the
/// checkpoint's own timestamp must sit within the drift tolerance of it.
pub fn checkpoint_outcome(
    contract: &Contract,
    cp: &Checkpoint,
    ingest_time: f64,
    config: &ChainConfig,
) -> Result<CheckpointOutcome, ContractError> {
    if !matches!(
        contract.state,
        ContractState::Accepted | ContractState::InTransit
    ) {
        return Err(ContractError::IllegalTransition {
            from: contract.state,
            to: ContractState::InTransit,
        });
    }

    // Rule 1: driver signature.
    let driver_key = contract
        .driver_key
        .as_deref()
        .ok_or(ContractError::NotTheDriver)?;
    let signing_bytes = checkpoint_signing_bytes(&contract.id, cp);
    if signatures::verify(driver_key, &signing_bytes, &cp.signature).is_err() {
        return Err(ContractError::BadCheckpointSignature);
    }

    // Rule 2: monotonic sequence.
    let expected_seq = contract.checkpoints.len() as u32 + 1;
    if cp.seq != expected_seq {
        return Err(ContractError::CheckpointOutOfOrder {
            expected: expected_seq,
            actual: cp.seq,
        });
    }

    // Rule 3: hash chain to the predecessor.
    let expected_prev = contract
        .last_checkpoint()
        .map(|prev| checkpoint_hash(&contract.id, prev))
        .unwrap_or([0u8; 32]);
    if cp.prev_hash != expected_prev {
        return Err(ContractError::CheckpointChainBroken { seq: cp.seq });
    }

    // Rule 4: timestamp within drift of ingest.
    let delta_s = (cp.timestamp - ingest_time).abs();
    if delta_s > config.t_drift_seconds {
        return Err(ContractError::CheckpointTimestampDrift { delta_s });
    }

    // Rule 5: reported GPS accuracy.
    if cp.accuracy_m > config.gps_accuracy_limit_m {
        return Err(ContractError::AccuracyTooLow {
            accuracy_m: cp.accuracy_m,
            limit_m: config.gps_accuracy_limit_m,
        });
    }

    // Rule 6: bounded step from the previous position.
    if let Some(prev) = contract.last_checkpoint() {
        let step_km = haversine_m(prev.position, cp.position) / 1000.0;
        if step_km > config.max_step_km {
            return Err(ContractError::StepTooLong {
                step_km,
                max_km: config.max_step_km,
            });
        }
    }

    // Rule 7: envelope membership.
    let envelope = RouteEnvelope::new(
        contract.pickup,
        contract.delivery,
        contract.tolerance_radius_m,
        config.max_step_km,
    );
    let envelope_distance = envelope.distance_m(cp.position);
    if envelope_distance > contract.tolerance_radius_m {
        return Err(ContractError::CheckpointOutOfTolerance {
            distance_m: envelope_distance,
        });
    }

    // Outcome. The first checkpoint must sit at the pickup; a checkpoint
    // within tolerance of the delivery terminates the transit.
    if contract.state == ContractState::Accepted {
        let pickup_distance = haversine_m(contract.pickup, cp.position);
        if pickup_distance > contract.tolerance_radius_m {
            return Err(ContractError::CheckpointOutOfTolerance {
                distance_m: pickup_distance,
            });
        }
        return Ok(CheckpointOutcome::EnteredTransit);
    }

    let delivery_distance = haversine_m(contract.delivery, cp.position);
    if delivery_distance <= contract.tolerance_radius_m {
        // Terminal checkpoints carry the tighter max-error bound.
        if cp.accuracy_m > contract.max_error_m {
            return Err(ContractError::TerminalAccuracyTooLow {
                accuracy_m: cp.accuracy_m,
                max_error_m: contract.max_error_m,
            });
        }
        return Ok(CheckpointOutcome::Delivered);
    }

    Ok(CheckpointOutcome::Progressed)
}
