//! # LC-04 Contracts - Proof-of-Delivery State Machine
//!
//! Lifecycle of logistics contracts:
//!
//! ```text
//! DRAFT → OPEN → ACCEPTED → IN_TRANSIT → DELIVERED → VALIDATED
//!   \        \         \          \                     (terminal)
//!    \        └─────────┴──────────┴──→ EXPIRED         (terminal)
//!     └──────────────────────────────→ DISPUTED         (terminal)
//! ```
//!
//! Checkpoints are validated in a fixed rule order; the first failing rule
//! names the error. The delivery envelope is the union of tolerance-radius
//! discs around pickup, delivery, and interpolated route samples.
//!
//! The registry is mutated only from applied blocks; every mutation returns
//! the prior contract state so reorgs can restore it.

pub mod domain;
pub mod registry;

pub use domain::envelope::RouteEnvelope;
pub use domain::errors::ContractError;
pub use domain::machine::{checkpoint_outcome, CheckpointOutcome};
pub use domain::payloads::{
    AcceptPayload, CheckpointPayload, ContractCreatePayload, DisputePayload, FinalizePayload,
};
pub use domain::payout::{payout_plan, PayoutPlan};
pub use registry::{ContractRegistry, StateChange};
