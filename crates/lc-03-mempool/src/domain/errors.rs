//! Mempool error types.

use shared_types::Hash;
use thiserror::Error;

/// Admission and mutation failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("duplicate transaction")]
    DuplicateTransaction { tx_hash: Hash },

    #[error("nonce gap too large: account at {account_nonce}, tx nonce {tx_nonce}, max gap {max_gap}")]
    NonceGapTooLarge {
        account_nonce: u64,
        tx_nonce: u64,
        max_gap: u64,
    },

    #[error("nonce already applied: account at {account_nonce}, tx nonce {tx_nonce}")]
    StaleNonce { account_nonce: u64, tx_nonce: u64 },

    #[error("insufficient fee bump: {old_rate} -> {new_rate} atoms/byte, need {min_bump_ppm} ppm over")]
    InsufficientFeeBump {
        old_rate: i128,
        new_rate: i128,
        min_bump_ppm: u32,
    },

    #[error("pool full: {in_use} of {capacity} bytes in use")]
    PoolFull { capacity: usize, in_use: usize },

    #[error("transaction not found")]
    TransactionNotFound { tx_hash: Hash },

    #[error("transaction larger than the pool: {size} bytes")]
    OversizedTransaction { size: usize },
}
