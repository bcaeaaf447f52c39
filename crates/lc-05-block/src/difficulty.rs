//! Leading-zero-bit difficulty.
//!
//! A block hash meets difficulty `d` when it starts with at least `d` zero
//! bits. Cumulative work credits 2^d per block. Retargeting compares the
//! observed interval duration with the expected one and moves the bit count
//! by whole bits, clamped to ±2 per step (a 4× swing, matching the
//! per-step clamp of [0.25×, 4×]).

use primitive_types::U256;
use shared_types::{ChainConfig, Hash};

/// Hardest difficulty the retarget may reach.
pub const MAX_DIFFICULTY_BITS: u32 = 240;

/// Easiest difficulty the retarget may reach.
pub const MIN_DIFFICULTY_BITS: u32 = 1;

/// Count leading zero bits of a hash.
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0u32;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// True when the hash clears the target.
pub fn meets_target(hash: &Hash, difficulty_bits: u32) -> bool {
    leading_zero_bits(hash) >= difficulty_bits
}

/// Expected work for one block at this difficulty: 2^bits.
pub fn work_for_bits(difficulty_bits: u32) -> U256 {
    if difficulty_bits >= 255 {
        return U256::MAX;
    }
    U256::one() << difficulty_bits
}

/// Difficulty for the next block.
///
/// Away from a retarget boundary the current bits carry over. At a boundary
/// the observed interval duration picks the adjustment:
///
/// - blocks ≥ 4× too fast → +2 bits, ≥ 2× too fast → +1 bit
/// - blocks ≥ 4× too slow → −2 bits, ≥ 2× too slow → −1 bit
pub fn next_difficulty(
    current_bits: u32,
    next_height: u64,
    interval_start_ts: f64,
    interval_end_ts: f64,
    config: &ChainConfig,
) -> u32 {
    let interval = config.difficulty_retarget_interval;
    if next_height == 0 || next_height % interval != 0 {
        return current_bits;
    }

    let expected_s = (interval * config.target_block_time_seconds) as f64;
    let actual_s = (interval_end_ts - interval_start_ts).max(1.0);

    let adjusted = if actual_s * 4.0 <= expected_s {
        current_bits + 2
    } else if actual_s * 2.0 <= expected_s {
        current_bits + 1
    } else if actual_s >= expected_s * 4.0 {
        current_bits.saturating_sub(2)
    } else if actual_s >= expected_s * 2.0 {
        current_bits.saturating_sub(1)
    } else {
        current_bits
    };

    adjusted.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0u8; 32]), 256);
        let mut hash = [0u8; 32];
        hash[0] = 0b0000_1000;
        assert_eq!(leading_zero_bits(&hash), 4);
        hash[0] = 0xFF;
        assert_eq!(leading_zero_bits(&hash), 0);
    }

    #[test]
    fn test_meets_target() {
        let mut hash = [0u8; 32];
        hash[2] = 1;
        // Two zero bytes then 0x01: 16 + 7 = 23 leading zero bits.
        assert!(meets_target(&hash, 23));
        assert!(!meets_target(&hash, 24));
    }

    #[test]
    fn test_work_doubles_per_bit() {
        assert_eq!(work_for_bits(3), U256::from(8));
        assert_eq!(work_for_bits(4), work_for_bits(3) * U256::from(2));
    }

    fn config() -> ChainConfig {
        ChainConfig::on_grid()
    }

    #[test]
    fn test_no_change_off_boundary() {
        assert_eq!(next_difficulty(16, 100, 0.0, 3000.0, &config()), 16);
    }

    #[test]
    fn test_fast_interval_hardens() {
        let cfg = config();
        let boundary = cfg.difficulty_retarget_interval;
        let expected = (boundary * cfg.target_block_time_seconds) as f64;
        // Twice too fast: one more bit.
        assert_eq!(
            next_difficulty(16, boundary, 0.0, expected / 2.0, &cfg),
            17
        );
        // Eight times too fast clamps at two bits.
        assert_eq!(
            next_difficulty(16, boundary, 0.0, expected / 8.0, &cfg),
            18
        );
    }

    #[test]
    fn test_slow_interval_eases() {
        let cfg = config();
        let boundary = cfg.difficulty_retarget_interval;
        let expected = (boundary * cfg.target_block_time_seconds) as f64;
        assert_eq!(
            next_difficulty(16, boundary, 0.0, expected * 2.0, &cfg),
            15
        );
        assert_eq!(
            next_difficulty(16, boundary, 0.0, expected * 10.0, &cfg),
            14
        );
    }

    #[test]
    fn test_bounds_clamped() {
        let cfg = config();
        let boundary = cfg.difficulty_retarget_interval;
        assert_eq!(next_difficulty(1, boundary, 0.0, f64::MAX, &cfg), 1);
        assert_eq!(
            next_difficulty(MAX_DIFFICULTY_BITS, boundary, 0.0, 1.0, &cfg),
            MAX_DIFFICULTY_BITS
        );
    }
}
