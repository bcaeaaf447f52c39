//! # Concurrent Mempool Wrapper
//!
//! Fine-grained locking around the single-threaded pool:
//!
//! - one global index lock (the pool itself)
//! - one lock per sender queue
//!
//! Lock order is strict: **global, then sender**. Every path below acquires
//! in that order, which rules out lock cycles.

use crate::domain::entities::{MempoolConfig, PooledTransaction};
use crate::domain::errors::MempoolError;
use crate::domain::pool::{AccountView, SelectedBundle, TransactionPool};
use parking_lot::Mutex;
use shared_types::{Address, Hash, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe mempool handle shared between the ingress and the assembler.
pub struct SharedMempool {
    /// Global index lock.
    pool: Mutex<TransactionPool>,
    /// Per-sender queue locks, acquired after the global lock.
    sender_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl SharedMempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            pool: Mutex::new(TransactionPool::new(config)),
            sender_locks: Mutex::new(HashMap::new()),
        }
    }

    fn sender_lock(&self, sender: &Address) -> Arc<Mutex<()>> {
        let mut registry = self.sender_locks.lock();
        registry.entry(*sender).or_default().clone()
    }

    /// Non-blocking enqueue used by the submission path.
    pub fn submit(
        &self,
        tx: Transaction,
        hash: Hash,
        size_bytes: usize,
        now: f64,
        view: &dyn AccountView,
    ) -> Result<Vec<Hash>, MempoolError> {
        let sender = tx.sender();
        let sender_lock = self.sender_lock(&sender);

        // Global first, then the sender queue.
        let mut pool = self.pool.lock();
        let _queue_guard = sender_lock.lock();
        let evicted = pool.add(tx, hash, size_bytes, now, view)?;
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "mempool evicted bundle under pressure");
        }
        Ok(evicted)
    }

    /// Assembler pull: take the best bundles under the block caps.
    pub fn take_for_block(
        &self,
        view: &dyn AccountView,
        max_count: usize,
        max_bytes: usize,
        now: f64,
    ) -> Vec<SelectedBundle> {
        self.pool.lock().select_bundles(view, max_count, max_bytes, now)
    }

    /// Applied-block notification from the chain actor.
    pub fn on_block_applied(&self, included: &[Hash], view: &dyn AccountView) -> Vec<Hash> {
        let mut pool = self.pool.lock();
        let dropped = pool.on_block_applied(included, view);

        // Release sender locks for queues that emptied out.
        let mut registry = self.sender_locks.lock();
        registry.retain(|_, lock| Arc::strong_count(lock) > 1);
        dropped
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.pool.lock().contains(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<PooledTransaction> {
        self.pool.lock().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().is_empty()
    }

    pub fn bytes_in_use(&self) -> usize {
        self.pool.lock().bytes_in_use()
    }

    pub fn config(&self) -> MempoolConfig {
        self.pool.lock().config().clone()
    }
}
