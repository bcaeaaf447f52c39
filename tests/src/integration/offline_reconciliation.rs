//! Off-grid blocks meeting the canonical chain again: the local suffix is
//! discarded, still-valid transactions re-enter the mempool, invalidated
//! ones are dropped.

#[cfg(test)]
mod tests {
    use crate::harness::{transfer, Harness};
    use lc_mempool::{MempoolConfig, SharedMempool};
    use node_runtime::offline::OfflineLedger;
    use shared_types::Amount;

    #[test]
    fn test_local_blocks_discarded_and_txs_replayed() {
        let mut harness = Harness::new(Harness::test_config(4));
        let a = Harness::wallet(0);
        let b = Harness::wallet(1);
        let c = Harness::wallet_address(2);
        let miner = Harness::wallet_address(3);

        // Divergence point: height 1.
        harness.mine_block(vec![], miner).unwrap();
        let divergence = harness.chain.tip();

        // The node goes dark and produces three local blocks on the
        // divergence tip. One carries A's nonce-1 spend, one carries B's
        // nonce-1 spend, one is empty.
        let tx_conflicting = transfer(&a, c, Amount::units(5), Amount::ZERO, 1, 65.0);
        let tx_survivor = transfer(&b, c, Amount::units(7), Amount::ZERO, 1, 95.0);

        let mut ledger = OfflineLedger::new();
        let (local1, local1_hash) = harness.build_block_on(
            divergence.hash,
            divergence.height,
            65.0,
            vec![tx_conflicting],
            miner,
            Vec::new(),
        );
        let (local2, local2_hash) = harness.build_block_on(
            local1_hash,
            divergence.height + 1,
            95.0,
            vec![tx_survivor],
            miner,
            Vec::new(),
        );
        let (local3, _) = harness.build_block_on(
            local2_hash,
            divergence.height + 2,
            125.0,
            vec![],
            miner,
            Vec::new(),
        );
        ledger.record(local1);
        ledger.record(local2);
        ledger.record(local3);
        assert_eq!(ledger.len(), 3);

        // Meanwhile the canonical network advanced past the divergence and
        // committed A's nonce 1 to someone else.
        let tx_canonical = transfer(&a, miner, Amount::units(9), Amount::ZERO, 1, 70.0);
        harness.mine_block(vec![tx_canonical], miner).unwrap();
        for _ in 0..3 {
            harness.mine_block(vec![], miner).unwrap();
        }
        assert_eq!(harness.chain.tip().height, 5);

        // Reconnection: canonical wins, local suffix replayed as txs.
        let mempool = SharedMempool::new(MempoolConfig::default());
        let report = ledger.reconcile(&harness.chain, &mempool, 200.0);

        assert_eq!(report.blocks_discarded, 3);
        // B's spend is still valid against canonical state.
        assert_eq!(report.txs_requeued, 1);
        // A's spend collided with the canonical nonce and is gone.
        assert_eq!(report.txs_dropped, 1);
        assert!(ledger.is_empty());
        assert_eq!(mempool.len(), 1);
    }
}
