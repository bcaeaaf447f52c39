//! Emission schedule.
//!
//! The base reward halves every `halving_interval_blocks`, counting blocks
//! of both operating modes, and stops once the supply cap is reached.

use shared_types::{Amount, ChainConfig};

/// Scheduled base reward at a height, before the supply cap.
pub fn block_reward(height: u64, config: &ChainConfig) -> Amount {
    let halvings = (height / config.halving_interval_blocks) as u32;
    config.base_block_reward.halved(halvings)
}

/// Reward actually mintable given what has been issued so far.
pub fn capped_reward(height: u64, issued: Amount, config: &ChainConfig) -> Amount {
    let scheduled = block_reward(height, config);
    let headroom = config
        .max_supply
        .checked_sub(issued)
        .unwrap_or(Amount::ZERO);
    if headroom < scheduled {
        headroom
    } else {
        scheduled
    }
}
