//! Block assembly and validation errors.

use shared_types::Hash;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum BlockError {
    #[error("invalid block structure: {reason}")]
    InvalidStructure { reason: String },

    #[error("block too large: {size} bytes, cap {cap}")]
    TooLarge { size: usize, cap: usize },

    #[error("too many transactions: {count}, cap {cap}")]
    TooManyTransactions { count: usize, cap: usize },

    #[error("height {actual} does not follow parent height {parent}")]
    WrongHeight { parent: u64, actual: u64 },

    #[error("timestamp drift {delta_s:.0}s beyond tolerance")]
    TimestampDrift { delta_s: f64 },

    #[error("merkle root mismatch")]
    MerkleMismatch,

    #[error("proof-of-work target missed: {got} leading zero bits, need {need}")]
    PoWTargetMissed { got: u32, need: u32 },

    #[error("invalid transaction signature at index {index}")]
    BadTransactionSignature { index: usize },

    #[error("sender pubkey does not match from address at index {index}")]
    PubkeyAddressMismatch { index: usize },

    #[error("non-contiguous nonce at index {index}: expected {expected}, got {actual}")]
    NonContiguousNonce {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("insufficient balance at index {index}")]
    InsufficientBalance { index: usize },

    #[error("reward transaction malformed or misplaced")]
    BadRewardPlacement,

    #[error("reward amount wrong: expected {expected}, got {actual}")]
    WrongRewardAmount { expected: String, actual: String },

    #[error("duplicate transaction in block")]
    DuplicateTransaction { tx_hash: Hash },

    #[error("mining cancelled by new parent")]
    MiningCancelled,

    #[error("nonce space exhausted")]
    NonceExhausted,
}
