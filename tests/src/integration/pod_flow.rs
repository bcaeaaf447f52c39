//! Proof-of-delivery end to end: create, accept, checkpoints along the
//! route, terminal checkpoint, quorum-attested finalization and payout,
//! plus the off-route rejection path.

#[cfg(test)]
mod tests {
    use crate::harness::{
        accept_contract_tx, checkpoint_tx, create_contract_tx, finalize_tx, make_checkpoint,
        sample_contract_terms, Harness,
    };
    use node_runtime::chain::ChainError;
    use lc_consensus::ConsensusError;
    use lc_contracts::ContractError;
    use shared_crypto::signatures::Ed25519Keypair;
    use shared_types::{Amount, ChainConfig, ContractState, GeoPoint};

    fn pod_config() -> ChainConfig {
        ChainConfig {
            committee_size: 4,
            ..Harness::test_config(3)
        }
    }

    fn route_point(t: f64) -> GeoPoint {
        let pickup = GeoPoint::new(-23.55, -46.63);
        let delivery = GeoPoint::new(-23.56, -46.64);
        GeoPoint::new(
            pickup.lat + (delivery.lat - pickup.lat) * t,
            pickup.lng + (delivery.lng - pickup.lng) * t,
        )
    }

    /// Drive a contract to IN_TRANSIT; returns (harness, contract_id,
    /// driver keypairs, next driver nonce).
    fn in_transit() -> (Harness, shared_types::Hash, Ed25519Keypair, u64) {
        let mut harness = Harness::new(pod_config());
        let establishment = Harness::wallet(0);
        let driver = Harness::wallet(1);
        let miner = Harness::wallet_address(2);
        let cp_key = Ed25519Keypair::from_seed([0x77; 32]);

        harness.register_validators(4);

        let ts = harness.next_timestamp();
        let (create, contract_id) =
            create_contract_tx(&establishment, &sample_contract_terms(Amount::units(10), 1e7), 1, ts);
        harness.mine_block(vec![create], miner).unwrap();
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::Open
        );

        let ts = harness.next_timestamp();
        let accept = accept_contract_tx(&driver, &cp_key, contract_id, 1, ts);
        harness.mine_block(vec![accept], miner).unwrap();
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::Accepted
        );

        // First checkpoint at the pickup.
        let ts = harness.next_timestamp();
        let cp1 = make_checkpoint(&cp_key, contract_id, 1, route_point(0.0), ts, 5.0, None);
        harness
            .mine_block(vec![checkpoint_tx(&driver, contract_id, cp1, 2, ts)], miner)
            .unwrap();
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::InTransit
        );

        (harness, contract_id, cp_key, 3)
    }

    #[test]
    fn test_delivery_happy_path_pays_the_driver() {
        let (mut harness, contract_id, cp_key, mut nonce) = in_transit();
        let driver = Harness::wallet(1);
        let miner = Harness::wallet_address(2);
        let driver_balance_before = harness.balance(&driver.address());
        let validators = harness.register_validators(4);

        // Four more checkpoints along the line; the last lands on the
        // delivery point with 5 m accuracy.
        for (i, t) in [0.25, 0.5, 0.75, 1.0].iter().enumerate() {
            let ts = harness.next_timestamp();
            let prev = harness
                .chain
                .contract(&contract_id)
                .unwrap()
                .last_checkpoint()
                .cloned();
            let cp = make_checkpoint(
                &cp_key,
                contract_id,
                (i + 2) as u32,
                route_point(*t),
                ts,
                5.0,
                prev.as_ref(),
            );
            harness
                .mine_block(vec![checkpoint_tx(&driver, contract_id, cp, nonce, ts)], miner)
                .unwrap();
            nonce += 1;
        }
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::Delivered
        );

        // Finalization requires the quorum; 3 of 4 committee members sign.
        let ts = harness.next_timestamp();
        let finalize = finalize_tx(&driver, contract_id, nonce, ts);
        harness
            .mine_block_attested(vec![finalize], miner, &validators[..3])
            .unwrap();

        let contract = harness.chain.contract(&contract_id).unwrap();
        assert_eq!(contract.state, ContractState::Validated);

        // 70% of (50 base + 10 escrow) = 42 units to the driver.
        let driver_after = harness.balance(&driver.address());
        assert_eq!(
            driver_after.checked_sub(driver_balance_before).unwrap(),
            Amount::units(42)
        );
        // Reputation moved toward 1.0 and metrics recorded the delivery.
        let account = harness.chain.account(&driver.address()).unwrap();
        assert!(account.reputation > 0.5);
        assert_eq!(account.metrics.deliveries, 1);

        // Conservation: everything issued is either a balance or live escrow.
        assert_eq!(
            harness
                .chain
                .total_balances()
                .checked_add(harness.chain.total_escrowed())
                .unwrap(),
            harness.chain.issued()
        );
    }

    #[test]
    fn test_finalize_without_quorum_is_rejected() {
        let (mut harness, contract_id, cp_key, nonce) = in_transit();
        let driver = Harness::wallet(1);
        let miner = Harness::wallet_address(2);

        // Jump straight to the delivery point.
        let ts = harness.next_timestamp();
        let prev = harness
            .chain
            .contract(&contract_id)
            .unwrap()
            .last_checkpoint()
            .cloned();
        let cp = make_checkpoint(&cp_key, contract_id, 2, route_point(1.0), ts, 5.0, prev.as_ref());
        harness
            .mine_block(vec![checkpoint_tx(&driver, contract_id, cp, nonce, ts)], miner)
            .unwrap();

        let ts = harness.next_timestamp();
        let finalize = finalize_tx(&driver, contract_id, nonce + 1, ts);
        let err = harness.mine_block(vec![finalize], miner).unwrap_err();
        assert!(matches!(
            err,
            ChainError::Consensus(ConsensusError::QuorumInsufficient { .. })
        ));
        // The contract is untouched by the rejected block.
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::Delivered
        );
    }

    #[test]
    fn test_off_route_checkpoint_rejected_then_flow_continues() {
        let (mut harness, contract_id, cp_key, nonce) = in_transit();
        let driver = Harness::wallet(1);
        let miner = Harness::wallet_address(2);

        // Checkpoint ~2 km east of the route.
        let ts = harness.next_timestamp();
        let prev = harness
            .chain
            .contract(&contract_id)
            .unwrap()
            .last_checkpoint()
            .cloned();
        let off_route = GeoPoint::new(-23.555, -46.615);
        let bad = make_checkpoint(&cp_key, contract_id, 2, off_route, ts, 5.0, prev.as_ref());
        let err = harness
            .mine_block(vec![checkpoint_tx(&driver, contract_id, bad, nonce, ts)], miner)
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Consensus(ConsensusError::PodRejected(
                ContractError::CheckpointOutOfTolerance { .. }
            ))
        ));
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::InTransit
        );

        // A subsequent valid checkpoint continues normally.
        let ts = harness.next_timestamp();
        let good = make_checkpoint(&cp_key, contract_id, 2, route_point(0.5), ts, 5.0, prev.as_ref());
        harness
            .mine_block(vec![checkpoint_tx(&driver, contract_id, good, nonce, ts)], miner)
            .unwrap();
        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::InTransit
        );
        assert_eq!(
            harness
                .chain
                .contract(&contract_id)
                .unwrap()
                .checkpoints
                .len(),
            2
        );
    }

    #[test]
    fn test_expiry_refunds_escrow_and_penalizes_driver() {
        let mut harness = Harness::new(pod_config());
        let establishment = Harness::wallet(0);
        let driver = Harness::wallet(1);
        let miner = Harness::wallet_address(2);
        let cp_key = Ed25519Keypair::from_seed([0x78; 32]);

        // Contract expiring shortly after acceptance.
        let ts = harness.next_timestamp();
        let (create, contract_id) =
            create_contract_tx(&establishment, &sample_contract_terms(Amount::units(10), ts + 45.0), 1, ts);
        harness.mine_block(vec![create], miner).unwrap();
        assert_eq!(harness.balance(&establishment.address()), Amount::units(990));

        let ts = harness.next_timestamp();
        let accept = accept_contract_tx(&driver, &cp_key, contract_id, 1, ts);
        harness.mine_block(vec![accept], miner).unwrap();

        let reputation_before = harness.chain.account(&driver.address()).unwrap().reputation;

        // Two empty blocks push block time past the deadline; the sweep
        // expires the contract and refunds the creator.
        harness.mine_block(vec![], miner).unwrap();
        harness.mine_block(vec![], miner).unwrap();

        assert_eq!(
            harness.chain.contract(&contract_id).unwrap().state,
            ContractState::Expired
        );
        assert_eq!(harness.balance(&establishment.address()), Amount::units(1000));
        let reputation_after = harness.chain.account(&driver.address()).unwrap().reputation;
        assert!(reputation_after < reputation_before);
    }
}
