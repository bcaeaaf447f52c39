//! Consensus error types.

use lc_contracts::ContractError;
use shared_types::{Hash, ValidatorId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConsensusError {
    #[error("quorum insufficient: {got} of {need} attestations")]
    QuorumInsufficient { got: usize, need: usize },

    #[error("attestation from outside the committee")]
    NotInCommittee { validator: ValidatorId },

    #[error("invalid attestation signature")]
    InvalidAttestation { validator: ValidatorId },

    #[error("duplicate attestation")]
    DuplicateAttestation { validator: ValidatorId },

    #[error("view change timed out at view {view}")]
    ViewChangeTimeout { view: u64 },

    #[error("proposer misbehavior")]
    ProposerMisbehavior { validator: ValidatorId },

    #[error("stake below the registration minimum")]
    InsufficientStake,

    #[error("validator key must be 32 bytes of Ed25519")]
    BadValidatorKey,

    #[error("block failed proof-of-work or structural validation: {0}")]
    BlockInvalid(#[from] lc_block::BlockError),

    #[error("proof-of-delivery gate rejected the block: {0}")]
    PodRejected(#[from] ContractError),

    #[error("reorg beyond window: depth {depth}, window {window}")]
    ReorgBeyondWindow { depth: u64, window: u64 },

    #[error("unknown parent block")]
    ParentUnknown { parent_hash: Hash },
}
