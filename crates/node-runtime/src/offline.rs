//! Off-grid reconciliation.
//!
//! While disconnected, an OFF_GRID node keeps producing small blocks with
//! no BFT quorum and tracks them in the offline ledger. On reconnection the
//! canonical mainnet wins: the local suffix is discarded and its
//! transactions are replayed against canonical state. Transactions that
//! still apply (nonce ahead of the canonical account, not yet committed)
//! re-enter the mempool for rebroadcast; invalidated ones are dropped.

use crate::chain::Chain;
use lc_mempool::SharedMempool;
use lc_storage::KeyValueStore;
use shared_crypto::tx_hash;
use shared_types::codec::transaction_size;
use shared_types::Block;
use tracing::info;

/// Blocks produced while disconnected.
#[derive(Debug, Default)]
pub struct OfflineLedger {
    local_blocks: Vec<Block>,
}

/// Outcome of a reconnection merge.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub blocks_discarded: usize,
    pub txs_requeued: usize,
    pub txs_dropped: usize,
}

impl OfflineLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, block: Block) {
        self.local_blocks.push(block);
    }

    pub fn len(&self) -> usize {
        self.local_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_blocks.is_empty()
    }

    /// Merge against the canonical chain after reconnection. The local
    /// blocks are dropped wholesale; surviving transactions go back to the
    /// mempool.
    pub fn reconcile<KV: KeyValueStore>(
        &mut self,
        chain: &Chain<KV>,
        mempool: &SharedMempool,
        now: f64,
    ) -> ReconcileReport {
        let snapshot = chain.snapshot();
        let mut report = ReconcileReport {
            blocks_discarded: self.local_blocks.len(),
            ..ReconcileReport::default()
        };

        for block in self.local_blocks.drain(..) {
            for tx in block.transactions {
                if tx.is_reward() {
                    continue;
                }
                let hash = tx_hash(&tx);
                let committed = chain.tx_is_committed(&hash).unwrap_or(false);
                let nonce_ok = tx.nonce > snapshot.wallets.nonce(&tx.sender());
                if committed || !nonce_ok {
                    report.txs_dropped += 1;
                    continue;
                }
                let size = transaction_size(&tx);
                match mempool.submit(tx, hash, size, now, &snapshot) {
                    Ok(_) => report.txs_requeued += 1,
                    Err(_) => report.txs_dropped += 1,
                }
            }
        }

        info!(
            discarded = report.blocks_discarded,
            requeued = report.txs_requeued,
            dropped = report.txs_dropped,
            "offline suffix reconciled against canonical chain"
        );
        report
    }
}
