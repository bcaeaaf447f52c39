//! Mempool entry and configuration types.

use serde::{Deserialize, Serialize};
use shared_types::{Hash, Transaction};

/// Weight of the ancestor fee-rate bonus in the priority score
/// (numerator / denominator = 0.5).
pub const ANCESTOR_BONUS_NUM: i128 = 1;
pub const ANCESTOR_BONUS_DEN: i128 = 2;

/// Age bonus: one atom-per-byte of priority per second in the pool,
/// capped at ten minutes. Applied at selection time only, so the ordered
/// index never goes stale.
pub const AGE_BONUS_CAP_S: f64 = 600.0;

/// Pool configuration, derived from the chain mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Total byte budget across all entries.
    pub max_bytes: usize,
    /// Tolerated nonce gap per sender.
    pub max_nonce_gap: u64,
    /// Minimum replace-by-fee bump in parts-per-million.
    pub rbf_min_bump_ppm: u32,
    /// Fee-per-byte floor (atoms per byte) a bundle must clear for blocks.
    pub block_min_fee_per_byte: i128,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_bytes: 268_435_456,
            max_nonce_gap: 16,
            rbf_min_bump_ppm: 100_000,
            block_min_fee_per_byte: 1,
        }
    }
}

/// One pooled transaction with its cached accounting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PooledTransaction {
    pub tx: Transaction,
    pub hash: Hash,
    /// Seconds since the Unix epoch at admission.
    pub received_at: f64,
    pub size_bytes: usize,
    /// Atoms of fee per encoded byte.
    pub fee_per_byte: i128,
    /// Index score fixed at admission: fee-per-byte plus the ancestor bonus.
    pub score: i128,
}

impl PooledTransaction {
    pub fn new(tx: Transaction, hash: Hash, size_bytes: usize, received_at: f64) -> Self {
        let fee_per_byte = if size_bytes == 0 {
            0
        } else {
            tx.fee.atoms() / size_bytes as i128
        };
        Self {
            tx,
            hash,
            received_at,
            size_bytes,
            fee_per_byte,
            score: fee_per_byte,
        }
    }

    pub fn priority_key(&self) -> PriorityKey {
        PriorityKey::new(self.score, self.received_at, self.hash)
    }

    pub fn sender(&self) -> shared_types::Address {
        self.tx.sender()
    }

    pub fn nonce(&self) -> u64 {
        self.tx.nonce
    }
}

/// Ordered-index key: higher score first, then earlier arrival, then hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriorityKey {
    pub score: i128,
    /// Milliseconds, for a total order over f64 arrival times.
    pub received_at_ms: u64,
    pub hash: Hash,
}

impl PriorityKey {
    pub fn new(score: i128, received_at: f64, hash: Hash) -> Self {
        Self {
            score,
            received_at_ms: (received_at * 1000.0) as u64,
            hash,
        }
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BTreeSet iterates ascending; the best entry must sort first.
        other
            .score
            .cmp(&self.score)
            .then(self.received_at_ms.cmp(&other.received_at_ms))
            .then(self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
