//! # LC-03 Mempool - Prioritized Pending Transactions
//!
//! Priority queue of pending transactions feeding the block assembler.
//!
//! ## Data Structures
//!
//! - `by_hash`: O(1) lookup by transaction hash
//! - `by_priority`: O(log n) ordered index (`BTreeSet`)
//! - `by_sender`: nonce-ordered queue per account
//!
//! ## Policies
//!
//! - Priority = fee-per-byte + ancestor bonus, age-boosted at selection
//! - Replace-by-fee on identical (sender, nonce) with a 10% minimum bump
//! - Child-pays-for-parent: selection works on whole same-sender nonce
//!   chains, admitted by aggregate fee/size
//! - Byte-capacity eviction of the lowest-priority bundle
//! - Per-sender nonce gaps tolerated up to a bound, but gapped entries are
//!   never block-eligible
//!
//! Locking: the concurrent wrapper takes the global index lock before any
//! per-sender lock, in that order only.

pub mod domain;
pub mod service;

pub use domain::entities::{MempoolConfig, PooledTransaction};
pub use domain::errors::MempoolError;
pub use domain::pool::{AccountView, SelectedBundle, TransactionPool};
pub use service::SharedMempool;
