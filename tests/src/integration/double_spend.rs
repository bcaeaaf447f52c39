//! Double-spend handling: same-nonce submissions at the mempool boundary,
//! and conflicting blocks resolved by cumulative work.

#[cfg(test)]
mod tests {
    use crate::harness::{transfer, Harness};
    use lc_mempool::{MempoolConfig, SharedMempool};
    use node_runtime::actors::spawn_chain_actor;
    use node_runtime::ingress::CoreHandle;
    use shared_bus::InMemoryEventBus;
    use shared_types::codec::encode_transaction;
    use shared_types::{Amount, CoreError};
    use std::sync::Arc;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_second_same_nonce_submission_rejected() {
        let harness = Harness::new(Harness::test_config(3));
        let a = Harness::wallet(0);
        let b = Harness::wallet_address(1);
        let c = Harness::wallet_address(2);

        let bus = Arc::new(InMemoryEventBus::new());
        let mempool = Arc::new(SharedMempool::new(MempoolConfig::default()));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = harness.config.clone();
        let handle = spawn_chain_actor(
            harness.chain,
            Arc::clone(&bus),
            Arc::clone(&mempool),
            shutdown_rx,
        );
        let core = CoreHandle::new(config, handle, Arc::clone(&mempool), bus);

        // Two spends of the same nonce toward different recipients.
        let tx1 = transfer(&a, b, Amount::units(80), Amount::units(1), 1, 30.0);
        let tx2 = transfer(&a, c, Amount::units(80), Amount::units(1), 1, 31.0);

        let receipt = core
            .submit_transaction(&encode_transaction(&tx1), 30.0)
            .await
            .unwrap();
        assert!(receipt.accepted);

        let err = core
            .submit_transaction(&encode_transaction(&tx2), 31.0)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTransaction { .. }));
        assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn test_partitioned_double_spend_resolved_by_work() {
        let mut harness = Harness::new(Harness::test_config(3));
        let a = Harness::wallet(0);
        let b = Harness::wallet_address(1);
        let c = Harness::wallet_address(2);
        let miner = Harness::wallet_address(2);
        let genesis = harness.chain.tip();

        // Partition one: A pays B, mined immediately.
        let tx_b = transfer(&a, b, Amount::units(80), Amount::ZERO, 1, 30.0);
        harness.mine_block(vec![tx_b], miner).unwrap();
        assert_eq!(harness.balance(&b), Amount::units(1080));

        // Partition two: A pays C on a competing branch off genesis that
        // accumulates more work (two blocks against one).
        let tx_c = transfer(&a, c, Amount::units(80), Amount::ZERO, 1, 35.0);
        let (fork1, fork1_hash) =
            harness.build_block_on(genesis.hash, 0, 35.0, vec![tx_c], miner, Vec::new());
        let (fork2, _) =
            harness.build_block_on(fork1_hash, 1, 65.0, vec![], miner, Vec::new());

        // At equal work the tie-break picks the lower hash, so the first
        // fork block may park or already win; the second block settles it
        // with strictly more work either way.
        let _ = harness.chain.apply_block(fork1, 35.0).unwrap();
        let applied = harness.chain.apply_block(fork2, 65.0).unwrap();
        assert!(applied.extended_chain);

        // The losing spend disappeared; the winning one stands.
        assert_eq!(harness.chain.tip().height, 2);
        assert_eq!(harness.balance(&b), Amount::units(1000));
        assert_eq!(harness.balance(&a.address()), Amount::units(920));
        // C is also the miner on the winning branch: 80 + two 50-unit rewards.
        assert_eq!(harness.balance(&c), Amount::units(1180));
    }
}
