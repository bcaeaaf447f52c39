//! Candidate assembly and nonce search.
//!
//! The assembler takes the transactions the mempool selected, prepends the
//! reward row, commits to them through the merkle root and searches the
//! nonce space for a hash clearing the target. Mining is CPU-bound and
//! checks a cancel flag so a new parent preempts a stale search.

use crate::errors::BlockError;
use crate::merkle::merkle_root;
use crate::reward::block_reward;
use shared_crypto::{block_hash, tx_hash};
use shared_types::{
    Address, Amount, Block, BlockHeader, ChainConfig, Hash, Transaction, TxType, PROTOCOL_VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Build the reward row for a block: scheduled emission plus the fees of
/// the included transactions, paid to the miner, always at index 0.
pub fn reward_transaction(
    miner: Address,
    height: u64,
    fees: Amount,
    timestamp: f64,
    config: &ChainConfig,
) -> Result<Transaction, BlockError> {
    let amount = block_reward(height, config)
        .checked_add(fees)
        .map_err(|_| BlockError::InvalidStructure {
            reason: "reward overflow".into(),
        })?;
    Ok(Transaction {
        version: PROTOCOL_VERSION,
        tx_type: TxType::MiningReward,
        from: None,
        to: Some(miner),
        amount,
        nonce: 0,
        fee: Amount::ZERO,
        timestamp,
        sender_pubkey: Vec::new(),
        payload: Vec::new(),
        signature: [0u8; 64],
    })
}

/// Assemble an unmined candidate on top of a parent.
pub fn build_candidate(
    parent_hash: Hash,
    parent_height: u64,
    selected: Vec<Transaction>,
    miner: Address,
    timestamp: f64,
    difficulty_bits: u32,
    config: &ChainConfig,
) -> Result<Block, BlockError> {
    let height = parent_height + 1;
    let fees: Amount = selected.iter().map(|tx| tx.fee).sum();
    let reward = reward_transaction(miner, height, fees, timestamp, config)?;

    let mut transactions = Vec::with_capacity(selected.len() + 1);
    transactions.push(reward);
    transactions.extend(selected);

    let tx_hashes: Vec<Hash> = transactions.iter().map(tx_hash).collect();
    let header = BlockHeader {
        version: PROTOCOL_VERSION,
        height,
        parent_hash,
        merkle_root: merkle_root(&tx_hashes),
        timestamp,
        difficulty: difficulty_bits,
        nonce: 0,
        miner,
        mode: config.mode,
    };

    Ok(Block {
        header,
        attestations: Vec::new(),
        transactions,
    })
}

/// Search the nonce space until the header hash clears the target.
///
/// Checks `cancel` periodically; a set flag aborts with `MiningCancelled`
/// so the caller can restart on the new parent.
pub fn mine(block: &mut Block, cancel: &AtomicBool) -> Result<Hash, BlockError> {
    const CANCEL_CHECK_MASK: u64 = 0x3FF;

    for nonce in 0..=u64::MAX {
        if nonce & CANCEL_CHECK_MASK == 0 && cancel.load(Ordering::Relaxed) {
            return Err(BlockError::MiningCancelled);
        }
        block.header.nonce = nonce;
        let hash = block_hash(&block.header);
        if crate::difficulty::meets_target(&hash, block.header.difficulty) {
            debug!(
                height = block.header.height,
                nonce, "nonce found for candidate"
            );
            return Ok(hash);
        }
    }
    Err(BlockError::NonceExhausted)
}
