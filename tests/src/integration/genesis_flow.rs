//! Genesis and the first block: a funded transfer, a mined block, and the
//! expected balances afterwards.

#[cfg(test)]
mod tests {
    use crate::harness::{transfer, Harness};
    use shared_crypto::signatures::{Keypair, SignatureScheme};
    use shared_types::Amount;

    #[test]
    fn test_genesis_then_first_block() {
        // Three wallets of 1000 units, trivial difficulty.
        let mut harness = Harness::new(Harness::test_config(3));
        let a = Harness::wallet(0);
        let b = Harness::wallet_address(1);
        let miner = Keypair::generate(SignatureScheme::EcdsaSecp256k1).address();

        assert_eq!(harness.chain.tip().height, 0);
        assert_eq!(harness.balance(&a.address()), Amount::units(1000));

        // A → B, 100 units with a 1-unit fee.
        let ts = harness.next_timestamp();
        let tx = transfer(&a, b, Amount::units(100), Amount::units(1), 1, ts);
        let applied = harness.mine_block(vec![tx], miner).unwrap();
        assert!(applied.extended_chain);

        assert_eq!(harness.chain.tip().height, 1);
        assert_eq!(harness.balance(&b), Amount::units(1100));
        assert_eq!(harness.balance(&a.address()), Amount::units(899));
        // 50 base reward plus the 1-unit fee.
        assert_eq!(harness.balance(&miner), Amount::units(51));
    }

    #[test]
    fn test_issued_supply_accounts_for_genesis_and_rewards() {
        let mut harness = Harness::new(Harness::test_config(3));
        let miner = Harness::wallet_address(2);

        harness.mine_block(vec![], miner).unwrap();
        harness.mine_block(vec![], miner).unwrap();

        // 3 × 1000 at genesis plus two 50-unit rewards.
        assert_eq!(harness.chain.issued(), Amount::units(3100));
        assert_eq!(harness.chain.total_balances(), Amount::units(3100));
    }

    #[test]
    fn test_incompatible_genesis_detected() {
        use lc_storage::{ChainStore, MemoryKv};
        use node_runtime::chain::{Chain, ChainError};
        use shared_types::ChainConfig;

        let dir = tempfile::TempDir::new().unwrap();
        let config = Harness::test_config(3);
        {
            let store =
                ChainStore::open(dir.path(), MemoryKv::new(), config.segment_max_bytes).unwrap();
            Chain::bootstrap(config.clone(), store).unwrap();
        }

        // Same data directory, different genesis parameters.
        let other = ChainConfig {
            genesis_wallets: 7,
            ..config
        };
        let store = ChainStore::open(dir.path(), MemoryKv::new(), other.segment_max_bytes).unwrap();
        // A fresh in-memory index is inconsistent with the manifest, but the
        // genesis mismatch is detected first from the manifest itself.
        let result = Chain::bootstrap(other, store);
        assert!(matches!(result, Err(ChainError::IncompatibleGenesis)));
    }
}
