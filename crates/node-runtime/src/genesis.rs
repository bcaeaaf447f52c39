//! Deterministic genesis.
//!
//! Genesis is height 0 with a zero parent, an empty transaction list and no
//! proof-of-work requirement. Wallet allocations are seeded directly into
//! state from deterministically derived addresses, so every node configured
//! the same way computes the same genesis hash.

use shared_crypto::signatures::Keypair;
use shared_crypto::{block_hash, derive_address, sha256, SignatureScheme};
use shared_types::{Address, Amount, Block, BlockHeader, ChainConfig, Hash, PROTOCOL_VERSION};

/// Fixed genesis timestamp (the chain epoch).
pub const GENESIS_TIMESTAMP: f64 = 0.0;

/// The genesis block for a configuration.
pub fn genesis_block(config: &ChainConfig) -> Block {
    Block {
        header: BlockHeader {
            version: PROTOCOL_VERSION,
            height: 0,
            parent_hash: [0u8; 32],
            merkle_root: [0u8; 32],
            timestamp: GENESIS_TIMESTAMP,
            difficulty: config.initial_difficulty_bits,
            nonce: 0,
            miner: shared_types::ZERO_ADDRESS,
            mode: config.mode,
        },
        attestations: Vec::new(),
        transactions: Vec::new(),
    }
}

pub fn genesis_hash(config: &ChainConfig) -> Hash {
    block_hash(&genesis_block(config).header)
}

/// The `i`-th genesis wallet keypair, derived from a fixed domain string.
/// Deterministic, so every node agrees on the allocation set and test
/// networks can spend from it.
pub fn genesis_wallet_keypair(index: u64) -> Keypair {
    let mut seed = sha256(format!("logichain-genesis-wallet-{index}").as_bytes());
    // A SHA-256 output is a valid secp256k1 scalar for all practical seeds;
    // re-hash on the astronomically unlikely exception.
    loop {
        match Keypair::from_seed(SignatureScheme::EcdsaSecp256k1, seed) {
            Ok(keypair) => return keypair,
            Err(_) => seed = sha256(&seed),
        }
    }
}

/// The `i`-th genesis wallet address.
pub fn genesis_wallet_address(index: u64) -> Address {
    derive_address(&genesis_wallet_keypair(index).public_key())
}

/// All genesis allocations for a configuration.
pub fn genesis_allocations(config: &ChainConfig) -> Vec<(Address, Amount)> {
    (0..config.genesis_wallets)
        .map(|i| (genesis_wallet_address(i), config.genesis_wallet_balance))
        .collect()
}
