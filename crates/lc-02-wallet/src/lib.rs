//! # LC-02 Wallet - Account State Store
//!
//! Address-indexed account state: balance, nonce, reputation and role
//! metrics. Mutated only through applied blocks; readers get cloned
//! snapshots from the chain actor.
//!
//! Invariant: no applied block may leave any balance negative. Debits are
//! checked, credits saturate at the supply cap far below `i128` range.

pub mod store;

pub use store::{WalletError, WalletStore};

/// Reputation pull toward 1.0 applied on a successful delivery.
pub const REPUTATION_SUCCESS_WEIGHT: f64 = 0.05;

/// Reputation pull toward 0.0 applied when a contract expires on a driver.
pub const REPUTATION_EXPIRY_WEIGHT: f64 = 0.2;
