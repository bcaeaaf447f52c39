//! # Transaction Pool - Priority Queue with Ancestor Bundling
//!
//! The single-threaded pool behind [`crate::SharedMempool`].
//!
//! Invariants enforced here:
//!
//! - no duplicate hashes
//! - per-sender entries keyed by nonce; gaps bounded, gapped tails never
//!   selected for blocks
//! - replace-by-fee requires the configured minimum bump
//! - the byte budget holds after every mutation

use super::entities::{
    MempoolConfig, PooledTransaction, PriorityKey, AGE_BONUS_CAP_S, ANCESTOR_BONUS_DEN,
    ANCESTOR_BONUS_NUM,
};
use super::errors::MempoolError;
use shared_types::{Address, Hash, Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Read access to committed account state, provided by the chain actor's
/// snapshot.
pub trait AccountView {
    /// Applied transaction count for a sender; the next valid nonce is
    /// `nonce + 1`.
    fn nonce(&self, address: &Address) -> u64;
}

/// A same-sender nonce chain selected for a block.
#[derive(Clone, Debug)]
pub struct SelectedBundle {
    pub sender: Address,
    pub txs: Vec<Transaction>,
    pub total_bytes: usize,
    /// Aggregate fee rate in atoms per byte.
    pub fee_rate: i128,
}

/// Multi-index pool.
#[derive(Debug, Default)]
pub struct TransactionPool {
    config: MempoolConfig,
    by_hash: HashMap<Hash, PooledTransaction>,
    by_priority: BTreeSet<PriorityKey>,
    by_sender: HashMap<Address, BTreeMap<u64, Hash>>,
    bytes_in_use: usize,
}

impl TransactionPool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&PooledTransaction> {
        self.by_hash.get(hash)
    }

    /// Admit a transaction.
    ///
    /// Returns the hashes evicted to make room (possibly including a
    /// replaced same-nonce predecessor).
    pub fn add(
        &mut self,
        tx: Transaction,
        hash: Hash,
        size_bytes: usize,
        now: f64,
        view: &dyn AccountView,
    ) -> Result<Vec<Hash>, MempoolError> {
        if self.by_hash.contains_key(&hash) {
            return Err(MempoolError::DuplicateTransaction { tx_hash: hash });
        }
        if size_bytes > self.config.max_bytes {
            return Err(MempoolError::OversizedTransaction { size: size_bytes });
        }

        let sender = tx.sender();
        let account_nonce = view.nonce(&sender);
        if tx.nonce <= account_nonce {
            return Err(MempoolError::StaleNonce {
                account_nonce,
                tx_nonce: tx.nonce,
            });
        }
        if tx.nonce > account_nonce + 1 + self.config.max_nonce_gap {
            return Err(MempoolError::NonceGapTooLarge {
                account_nonce,
                tx_nonce: tx.nonce,
                max_gap: self.config.max_nonce_gap,
            });
        }

        let mut entry = PooledTransaction::new(tx, hash, size_bytes, now);
        let mut removed = Vec::new();

        // Replace-by-fee on identical (sender, nonce).
        if let Some(&existing_hash) = self.by_sender.get(&sender).and_then(|m| m.get(&entry.nonce()))
        {
            let existing = &self.by_hash[&existing_hash];
            let floor = existing.fee_per_byte * (1_000_000 + self.config.rbf_min_bump_ppm as i128);
            if entry.fee_per_byte * 1_000_000 < floor {
                return Err(MempoolError::InsufficientFeeBump {
                    old_rate: existing.fee_per_byte,
                    new_rate: entry.fee_per_byte,
                    min_bump_ppm: self.config.rbf_min_bump_ppm,
                });
            }
            self.remove_entry(&existing_hash);
            removed.push(existing_hash);
        }

        // Capacity: evict strictly worse bundles until the entry fits.
        while self.bytes_in_use + size_bytes > self.config.max_bytes {
            let Some(worst) = self.worst_key() else {
                return Err(MempoolError::PoolFull {
                    capacity: self.config.max_bytes,
                    in_use: self.bytes_in_use,
                });
            };
            if worst.score >= entry.fee_per_byte {
                // Never evict an equal-or-better bundle for a newcomer.
                return Err(MempoolError::PoolFull {
                    capacity: self.config.max_bytes,
                    in_use: self.bytes_in_use,
                });
            }
            removed.extend(self.evict_lowest_bundle());
        }

        entry.score = entry.fee_per_byte + self.ancestor_bonus(&sender, entry.nonce());
        self.insert_entry(entry);
        Ok(removed)
    }

    /// Mean ancestor fee rate, weighted into the score.
    fn ancestor_bonus(&self, sender: &Address, nonce: u64) -> i128 {
        let Some(queue) = self.by_sender.get(sender) else {
            return 0;
        };
        let mut total_fee = 0i128;
        let mut total_size = 0i128;
        // Walk the contiguous run directly below this nonce.
        let mut expected = nonce.saturating_sub(1);
        while let Some(hash) = queue.get(&expected) {
            let entry = &self.by_hash[hash];
            total_fee += entry.tx.fee.atoms();
            total_size += entry.size_bytes as i128;
            if expected == 0 {
                break;
            }
            expected -= 1;
        }
        if total_size == 0 {
            return 0;
        }
        (total_fee / total_size) * ANCESTOR_BONUS_NUM / ANCESTOR_BONUS_DEN
    }

    fn insert_entry(&mut self, entry: PooledTransaction) {
        self.bytes_in_use += entry.size_bytes;
        self.by_priority.insert(entry.priority_key());
        self.by_sender
            .entry(entry.sender())
            .or_default()
            .insert(entry.nonce(), entry.hash);
        self.by_hash.insert(entry.hash, entry);
    }

    fn remove_entry(&mut self, hash: &Hash) -> Option<PooledTransaction> {
        let entry = self.by_hash.remove(hash)?;
        self.bytes_in_use -= entry.size_bytes;
        self.by_priority.remove(&entry.priority_key());
        if let Some(queue) = self.by_sender.get_mut(&entry.sender()) {
            queue.remove(&entry.nonce());
            if queue.is_empty() {
                self.by_sender.remove(&entry.sender());
            }
        }
        Some(entry)
    }

    pub fn remove(&mut self, hash: &Hash) -> Result<PooledTransaction, MempoolError> {
        self.remove_entry(hash)
            .ok_or(MempoolError::TransactionNotFound { tx_hash: *hash })
    }

    fn worst_key(&self) -> Option<PriorityKey> {
        self.by_priority.iter().next_back().copied()
    }

    /// Evict the lowest-priority entry together with its same-sender
    /// descendants (they would be gapped without it).
    pub fn evict_lowest_bundle(&mut self) -> Vec<Hash> {
        let Some(worst) = self.worst_key() else {
            return Vec::new();
        };
        let Some(entry) = self.by_hash.get(&worst.hash) else {
            return Vec::new();
        };
        let sender = entry.sender();
        let nonce = entry.nonce();

        let descendants: Vec<Hash> = self
            .by_sender
            .get(&sender)
            .map(|queue| queue.range(nonce..).map(|(_, h)| *h).collect())
            .unwrap_or_default();

        for hash in &descendants {
            self.remove_entry(hash);
        }
        descendants
    }

    /// Pull the highest-priority bundles that fit the caps.
    ///
    /// Bundles are whole same-sender nonce chains starting at the account's
    /// next nonce; a chain tail is trimmed when the caps require it. A bundle
    /// is admitted only when its aggregate fee rate clears the block floor,
    /// which is what lets a high-fee child carry its low-fee parent.
    pub fn select_bundles(
        &self,
        view: &dyn AccountView,
        max_count: usize,
        max_bytes: usize,
        now: f64,
    ) -> Vec<SelectedBundle> {
        let mut candidates: Vec<SelectedBundle> = Vec::new();

        for (sender, queue) in &self.by_sender {
            let mut txs = Vec::new();
            let mut total_fee = 0i128;
            let mut total_bytes = 0usize;
            let mut oldest = f64::MAX;

            let mut expected = view.nonce(sender) + 1;
            while let Some(hash) = queue.get(&expected) {
                let entry = &self.by_hash[hash];
                txs.push(entry.tx.clone());
                total_fee += entry.tx.fee.atoms();
                total_bytes += entry.size_bytes;
                oldest = oldest.min(entry.received_at);
                expected += 1;
            }
            if txs.is_empty() || total_bytes == 0 {
                continue;
            }

            let age_bonus = (now - oldest).clamp(0.0, AGE_BONUS_CAP_S) as i128;
            candidates.push(SelectedBundle {
                sender: *sender,
                txs,
                total_bytes,
                fee_rate: total_fee / total_bytes as i128 + age_bonus,
            });
        }

        candidates.sort_by(|a, b| b.fee_rate.cmp(&a.fee_rate).then(a.sender.cmp(&b.sender)));

        let mut selected = Vec::new();
        let mut used_count = 0usize;
        let mut used_bytes = 0usize;

        for mut bundle in candidates {
            // Trim the tail until the bundle fits what is left.
            while !bundle.txs.is_empty()
                && (used_count + bundle.txs.len() > max_count
                    || used_bytes + bundle.total_bytes > max_bytes)
            {
                let dropped = bundle.txs.pop().expect("non-empty");
                let dropped_size = self
                    .by_sender
                    .get(&bundle.sender)
                    .and_then(|q| q.get(&dropped.nonce))
                    .and_then(|h| self.by_hash.get(h))
                    .map(|e| e.size_bytes)
                    .unwrap_or(0);
                bundle.total_bytes -= dropped_size;
            }
            if bundle.txs.is_empty() {
                continue;
            }

            let total_fee: i128 = bundle.txs.iter().map(|t| t.fee.atoms()).sum();
            let aggregate_rate = total_fee / bundle.total_bytes as i128;
            if aggregate_rate < self.config.block_min_fee_per_byte {
                continue;
            }

            used_count += bundle.txs.len();
            used_bytes += bundle.total_bytes;
            bundle.fee_rate = aggregate_rate;
            selected.push(bundle);

            if used_count >= max_count || used_bytes >= max_bytes {
                break;
            }
        }
        selected
    }

    /// Drop entries made obsolete by an applied block: everything included
    /// plus any entry whose nonce the chain has already passed.
    pub fn on_block_applied(&mut self, included: &[Hash], view: &dyn AccountView) -> Vec<Hash> {
        let mut dropped = Vec::new();
        for hash in included {
            if self.remove_entry(hash).is_some() {
                dropped.push(*hash);
            }
        }

        let stale: Vec<Hash> = self
            .by_sender
            .iter()
            .flat_map(|(sender, queue)| {
                let account_nonce = view.nonce(sender);
                queue
                    .range(..=account_nonce)
                    .map(|(_, h)| *h)
                    .collect::<Vec<_>>()
            })
            .collect();
        for hash in stale {
            if self.remove_entry(&hash).is_some() {
                dropped.push(hash);
            }
        }
        dropped
    }
}
