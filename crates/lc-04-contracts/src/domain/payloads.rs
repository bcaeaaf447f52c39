//! Transaction payload structs for contract operations.
//!
//! These ride in the opaque payload field of their transaction and are
//! encoded with bincode. Versioning lives at the transaction layer.

use super::errors::ContractError;
use serde::{Deserialize, Serialize};
use shared_types::{Amount, CargoManifest, Checkpoint, GeoPoint, Hash, PublicKeyBytes};

/// CONTRACT_CREATE: terms fixed by the establishment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractCreatePayload {
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    pub tolerance_radius_m: f64,
    pub max_error_m: f64,
    pub cargo: CargoManifest,
    pub escrow: Amount,
    pub expires_at: f64,
}

/// CONTRACT_ACCEPT: a driver takes the job and registers the Ed25519 key
/// their checkpoints will be signed with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptPayload {
    pub contract_id: Hash,
    pub checkpoint_key: PublicKeyBytes,
}

/// CONTRACT_CHECKPOINT: one geolocated waypoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub contract_id: Hash,
    pub checkpoint: Checkpoint,
}

/// CONTRACT_FINALIZE: requests the VALIDATED transition for a delivered
/// contract; the quorum rides on the containing block's attestations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizePayload {
    pub contract_id: Hash,
}

/// CONTRACT_DISPUTE: freezes the contract pending off-chain resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisputePayload {
    pub contract_id: Hash,
    pub reason: String,
}

macro_rules! payload_codec {
    ($ty:ty) => {
        impl $ty {
            pub fn to_bytes(&self) -> Vec<u8> {
                bincode::serialize(self).expect("payload serialization is infallible")
            }

            pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
                bincode::deserialize(bytes).map_err(|e| ContractError::MalformedPayload {
                    detail: e.to_string(),
                })
            }
        }
    };
}

payload_codec!(ContractCreatePayload);
payload_codec!(AcceptPayload);
payload_codec!(CheckpointPayload);
payload_codec!(FinalizePayload);
payload_codec!(DisputePayload);
