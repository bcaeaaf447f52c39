//! Stateless block validation.
//!
//! Checks run in a fixed order, cheapest first: structure and caps, header
//! linkage and proof-of-work, then per-transaction signatures (verified in
//! parallel), nonce contiguity and balances. The consensus engine adds the
//! PoD and quorum gates after these pass.

use crate::difficulty::{leading_zero_bits, meets_target};
use crate::errors::BlockError;
use crate::merkle::merkle_root;
use crate::reward::block_reward;
use rayon::prelude::*;
use shared_crypto::{block_hash, derive_address, signatures, tx_hash};
use shared_types::codec::{block_size, tx_signing_bytes};
use shared_types::{Address, Amount, Block, BlockHeader, ChainConfig, Hash};
use std::collections::{HashMap, HashSet};

/// Read access to the committed state snapshot the block builds on.
pub trait StateView {
    fn nonce(&self, address: &Address) -> u64;
    fn balance(&self, address: &Address) -> Amount;
}

/// Structure and cap checks: caps per mode, exactly one reward row at
/// index 0, no duplicate transactions.
pub fn validate_structure(block: &Block, config: &ChainConfig) -> Result<(), BlockError> {
    if block.transactions.len() > config.tx_count_cap {
        return Err(BlockError::TooManyTransactions {
            count: block.transactions.len(),
            cap: config.tx_count_cap,
        });
    }

    let size = block_size(block);
    if size > config.block_size_cap_bytes {
        return Err(BlockError::TooLarge {
            size,
            cap: config.block_size_cap_bytes,
        });
    }

    // Exactly one reward row, and it sits at index 0.
    let reward_count = block.transactions.iter().filter(|tx| tx.is_reward()).count();
    if reward_count != 1 || block.reward_tx().is_none() {
        return Err(BlockError::BadRewardPlacement);
    }

    let mut seen: HashSet<Hash> = HashSet::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        if !seen.insert(tx_hash(tx)) {
            return Err(BlockError::DuplicateTransaction { tx_hash: tx_hash(tx) });
        }
    }
    Ok(())
}

/// Header checks against the resolved parent: height, timestamp window,
/// merkle commitment, proof-of-work.
pub fn validate_header(
    block: &Block,
    parent: &BlockHeader,
    now: f64,
    config: &ChainConfig,
) -> Result<(), BlockError> {
    let header = &block.header;

    if header.height != parent.height + 1 {
        return Err(BlockError::WrongHeight {
            parent: parent.height,
            actual: header.height,
        });
    }

    // Monotonic within drift: no more than T_DRIFT behind the parent, no
    // more than 2·T_DRIFT into the future of local time.
    if header.timestamp < parent.timestamp - config.t_drift_seconds {
        return Err(BlockError::TimestampDrift {
            delta_s: parent.timestamp - header.timestamp,
        });
    }
    if header.timestamp > now + 2.0 * config.t_drift_seconds {
        return Err(BlockError::TimestampDrift {
            delta_s: header.timestamp - now,
        });
    }

    let tx_hashes: Vec<Hash> = block.transactions.iter().map(tx_hash).collect();
    if merkle_root(&tx_hashes) != header.merkle_root {
        return Err(BlockError::MerkleMismatch);
    }

    let hash = block_hash(header);
    if !meets_target(&hash, header.difficulty) {
        return Err(BlockError::PoWTargetMissed {
            got: leading_zero_bits(&hash),
            need: header.difficulty,
        });
    }
    Ok(())
}

/// Transaction checks against the parent state snapshot.
///
/// Signatures verify in parallel; nonce and balance accounting walk the
/// block in order so intra-block sequences stay contiguous and no sender
/// overdraws across several transactions.
pub fn validate_transactions(
    block: &Block,
    view: &dyn StateView,
    config: &ChainConfig,
) -> Result<(), BlockError> {
    // Signature pass (reward rows are unsigned by construction).
    let failed = block
        .transactions
        .par_iter()
        .enumerate()
        .skip(1)
        .find_map_any(|(index, tx)| {
            if tx.is_reward() {
                return Some(BlockError::BadRewardPlacement);
            }
            let Some(from) = tx.from else {
                return Some(BlockError::PubkeyAddressMismatch { index });
            };
            if derive_address(&tx.sender_pubkey) != from {
                return Some(BlockError::PubkeyAddressMismatch { index });
            }
            if signatures::verify(&tx.sender_pubkey, &tx_signing_bytes(tx), &tx.signature).is_err()
            {
                return Some(BlockError::BadTransactionSignature { index });
            }
            None
        });
    if let Some(err) = failed {
        return Err(err);
    }

    // Reward amount: scheduled emission plus the block's fees.
    let fees: Amount = block.transactions.iter().skip(1).map(|tx| tx.fee).sum();
    let expected = block_reward(block.header.height, config)
        .checked_add(fees)
        .map_err(|_| BlockError::InvalidStructure {
            reason: "reward overflow".into(),
        })?;
    let reward = block.reward_tx().ok_or(BlockError::BadRewardPlacement)?;
    if reward.amount != expected {
        return Err(BlockError::WrongRewardAmount {
            expected: expected.to_string(),
            actual: reward.amount.to_string(),
        });
    }

    // Nonce and balance walk.
    let mut next_nonce: HashMap<Address, u64> = HashMap::new();
    let mut spent: HashMap<Address, Amount> = HashMap::new();

    for (index, tx) in block.transactions.iter().enumerate().skip(1) {
        let sender = tx.sender();
        let expected_nonce = next_nonce
            .get(&sender)
            .copied()
            .unwrap_or_else(|| view.nonce(&sender) + 1);
        if tx.nonce != expected_nonce {
            return Err(BlockError::NonContiguousNonce {
                index,
                expected: expected_nonce,
                actual: tx.nonce,
            });
        }
        next_nonce.insert(sender, expected_nonce + 1);

        let outgoing = tx
            .amount
            .checked_add(tx.fee)
            .map_err(|_| BlockError::InsufficientBalance { index })?;
        let already = spent.get(&sender).copied().unwrap_or(Amount::ZERO);
        let total = already
            .checked_add(outgoing)
            .map_err(|_| BlockError::InsufficientBalance { index })?;
        if total > view.balance(&sender) {
            return Err(BlockError::InsufficientBalance { index });
        }
        spent.insert(sender, total);
    }
    Ok(())
}
