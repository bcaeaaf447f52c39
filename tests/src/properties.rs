//! Chain-level properties over randomly generated histories.
//!
//! Each generated block is applied for real; the invariants are checked
//! after every application, not just at the end.

#[cfg(test)]
mod tests {
    use crate::harness::{transfer, Harness};
    use lc_block::difficulty::leading_zero_bits;
    use lc_block::merkle_root;
    use lc_mempool::{AccountView, MempoolConfig, TransactionPool};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shared_crypto::{block_hash, tx_hash};
    use shared_types::codec::{decode_block, encode_block, encode_transaction, decode_transaction};
    use shared_types::{Address, Amount, Hash};
    use std::collections::HashMap;

    const WALLETS: u64 = 5;

    /// Generate `blocks` random transfer blocks and return the harness.
    fn random_chain(seed: u64, blocks: usize) -> Harness {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut harness = Harness::new(Harness::test_config(WALLETS));
        let mut nonces: HashMap<u64, u64> = HashMap::new();

        for _ in 0..blocks {
            let mut txs = Vec::new();
            let mut pending: HashMap<u64, Amount> = HashMap::new();
            let ts = harness.next_timestamp();
            for _ in 0..rng.gen_range(0..4) {
                let from_index = rng.gen_range(0..WALLETS);
                let to_index = (from_index + 1 + rng.gen_range(0..WALLETS - 1)) % WALLETS;
                let from = Harness::wallet(from_index);
                let amount = Amount::units(rng.gen_range(1..10));
                let fee = Amount::from_atoms(rng.gen_range(0..1_000_000));
                let outgoing = amount.checked_add(fee).unwrap();

                // Keep the block solvent: committed balance minus what this
                // block already spends must cover the new transfer.
                let spent = pending.entry(from_index).or_insert(Amount::ZERO);
                let available = harness
                    .balance(&from.address())
                    .checked_sub(*spent)
                    .unwrap_or(Amount::ZERO);
                if available < outgoing {
                    continue;
                }
                *spent = spent.checked_add(outgoing).unwrap();

                let nonce = nonces.entry(from_index).or_insert(0);
                *nonce += 1;
                txs.push(transfer(
                    &from,
                    Harness::wallet_address(to_index),
                    amount,
                    fee,
                    *nonce,
                    ts,
                ));
            }
            let miner = Harness::wallet_address(rng.gen_range(0..WALLETS));
            harness.mine_block(txs, miner).expect("random block applies");
            assert_invariants(&harness);
        }
        harness
    }

    /// The universal invariants at the current height.
    fn assert_invariants(harness: &Harness) {
        let tip = harness.chain.tip();

        // Conservation: balances + live escrow == issued per schedule.
        assert_eq!(
            harness
                .chain
                .total_balances()
                .checked_add(harness.chain.total_escrowed())
                .unwrap(),
            harness.chain.issued()
        );

        let mut nonces_seen: HashMap<Address, u64> = HashMap::new();
        for height in 0..=tip.height {
            let block = harness
                .chain
                .block_by_height(height)
                .unwrap()
                .expect("canonical block readable");

            // Merkle recomputation matches the stored root.
            let hashes: Vec<Hash> = block.transactions.iter().map(tx_hash).collect();
            assert_eq!(merkle_root(&hashes), block.header.merkle_root);

            // The block hash clears its own difficulty (genesis exempt).
            if height > 0 {
                assert!(
                    leading_zero_bits(&block_hash(&block.header)) >= block.header.difficulty
                );
            }

            // Included nonces are 1, 2, 3, … per sender across the chain.
            for tx in block.transactions.iter().filter(|tx| !tx.is_reward()) {
                let expected = nonces_seen.entry(tx.sender()).or_insert(0);
                *expected += 1;
                assert_eq!(tx.nonce, *expected);
            }
        }

        // No balance ever goes negative.
        for (_, account) in harness.chain.snapshot().wallets.iter() {
            assert!(!account.balance.is_negative());
        }
    }

    #[test]
    fn test_random_chain_holds_invariants() {
        for seed in [7u64, 1234, 998877] {
            let harness = random_chain(seed, 12);
            assert!(harness.chain.tip().height >= 12);
        }
    }

    #[test]
    fn test_reorg_equals_linear_application() {
        // Two identically configured nodes: one learns the fork after first
        // following the losing branch, the other sees only the winning
        // branch. They must converge to identical state.
        let mut forked = Harness::new(Harness::test_config(3));
        let mut linear = Harness::new(Harness::test_config(3));
        let a = Harness::wallet(0);
        let miner = Harness::wallet_address(2);
        let genesis = forked.chain.tip();

        // Losing branch: one block on the forked node only.
        let losing_tx = transfer(&a, Harness::wallet_address(1), Amount::units(11), Amount::ZERO, 1, 30.0);
        let (losing, _) =
            forked.build_block_on(genesis.hash, 0, 30.0, vec![losing_tx], miner, Vec::new());
        forked.chain.apply_block(losing, 30.0).unwrap();

        // Winning branch: two blocks, applied to both nodes.
        let winning_tx = transfer(&a, miner, Amount::units(3), Amount::ZERO, 1, 40.0);
        let (win1, win1_hash) =
            forked.build_block_on(genesis.hash, 0, 40.0, vec![winning_tx], miner, Vec::new());
        let (win2, _) = forked.build_block_on(win1_hash, 1, 70.0, vec![], miner, Vec::new());

        let _ = forked.chain.apply_block(win1.clone(), 40.0);
        forked.chain.apply_block(win2.clone(), 70.0).unwrap();

        linear.chain.apply_block(win1, 40.0).unwrap();
        linear.chain.apply_block(win2, 70.0).unwrap();

        // Same tip, same balances, same issuance.
        assert_eq!(forked.chain.tip().hash, linear.chain.tip().hash);
        assert_eq!(forked.chain.issued(), linear.chain.issued());
        for index in 0..3 {
            let address = Harness::wallet_address(index);
            assert_eq!(forked.balance(&address), linear.balance(&address));
        }
    }

    #[test]
    fn test_wire_round_trip_over_generated_blocks() {
        let harness = random_chain(42, 6);
        for height in 0..=harness.chain.tip().height {
            let block = harness.chain.block_by_height(height).unwrap().unwrap();
            let bytes = encode_block(&block);
            let decoded = decode_block(&bytes).unwrap();
            // Bit-for-bit stability through a decode/encode cycle.
            assert_eq!(encode_block(&decoded), bytes);

            for tx in &block.transactions {
                let tx_bytes = encode_transaction(tx);
                assert_eq!(encode_transaction(&decode_transaction(&tx_bytes).unwrap()), tx_bytes);
            }
        }
    }

    #[test]
    fn test_rbf_requires_ten_percent_everywhere() {
        struct Zero;
        impl AccountView for Zero {
            fn nonce(&self, _: &Address) -> u64 {
                0
            }
        }

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..50 {
            let mut pool = TransactionPool::new(MempoolConfig::default());
            let base_fee: i128 = rng.gen_range(1_000..1_000_000);
            let a = Harness::wallet(0);
            let original = transfer(
                &a,
                Harness::wallet_address(1),
                Amount::units(1),
                Amount::from_atoms(base_fee * 100),
                1,
                0.0,
            );
            let original_hash = tx_hash(&original);
            pool.add(original, original_hash, 100, 0.0, &Zero).unwrap();

            // A random bump factor in [1.0, 1.3); only ≥ 1.1 may replace.
            let factor = 1.0 + rng.gen_range(0.0..0.3);
            let bumped_fee = (base_fee as f64 * factor) as i128 * 100;
            let replacement = transfer(
                &a,
                Harness::wallet_address(2),
                Amount::units(1),
                Amount::from_atoms(bumped_fee),
                1,
                1.0,
            );
            let replacement_hash = tx_hash(&replacement);
            let result = pool.add(replacement, replacement_hash, 100, 1.0, &Zero);

            let old_rate = base_fee;
            let new_rate = bumped_fee / 100;
            if new_rate * 1_000_000 >= old_rate * 1_100_000 {
                result.expect("sufficient bump replaces");
                assert!(pool.contains(&replacement_hash));
            } else {
                result.expect_err("insufficient bump rejected");
                assert!(pool.contains(&original_hash));
            }
        }
    }
}
