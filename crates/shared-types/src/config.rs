//! Chain configuration.
//!
//! One flat structure holds every tunable the core consumes, with the two
//! operating modes expressed as preset constructors. Values not overridden by
//! the operator come from the mode preset.

use crate::amount::Amount;
use serde::{Deserialize, Serialize};

/// Operating mode. OFF_GRID trades capacity and finality for the ability to
/// keep producing blocks without connectivity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainMode {
    #[default]
    OnGrid,
    OffGrid,
}

impl ChainMode {
    pub fn to_wire(self) -> u8 {
        match self {
            ChainMode::OnGrid => 0,
            ChainMode::OffGrid => 1,
        }
    }

    pub fn from_wire(byte: u8) -> Option<ChainMode> {
        match byte {
            0 => Some(ChainMode::OnGrid),
            1 => Some(ChainMode::OffGrid),
            _ => None,
        }
    }
}

/// Payout split applied when a delivery contract reaches VALIDATED.
/// Shares are parts-per-million and must sum to 1_000_000.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    pub driver_ppm: u32,
    pub validators_ppm: u32,
    pub reserve_ppm: u32,
}

impl Default for RewardSplit {
    fn default() -> Self {
        Self {
            driver_ppm: 700_000,
            validators_ppm: 200_000,
            reserve_ppm: 100_000,
        }
    }
}

impl RewardSplit {
    pub fn is_complete(&self) -> bool {
        self.driver_ppm as u64 + self.validators_ppm as u64 + self.reserve_ppm as u64 == 1_000_000
    }
}

/// Full core configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub mode: ChainMode,

    // --- Block production ---------------------------------------------------
    pub target_block_time_seconds: u64,
    pub block_size_cap_bytes: usize,
    pub tx_count_cap: usize,
    pub difficulty_retarget_interval: u64,
    /// Leading-zero-bit requirement for the genesis difficulty.
    pub initial_difficulty_bits: u32,
    pub base_block_reward: Amount,
    pub halving_interval_blocks: u64,
    pub max_supply: Amount,

    // --- Mempool ------------------------------------------------------------
    pub mempool_max_bytes: usize,
    /// Tolerated nonce gap per sender; gapped entries are not block-eligible.
    pub mempool_nonce_gap: u64,
    /// Minimum replace-by-fee bump, parts-per-million over the prior rate.
    pub rbf_min_bump_ppm: u32,

    // --- Consensus ----------------------------------------------------------
    pub committee_size: usize,
    pub epoch_blocks: u64,
    pub reorg_window: u64,
    pub proposal_timeout_seconds: u64,
    /// View-change timeouts double per change up to this multiplier.
    pub view_timeout_cap_factor: u32,
    pub validator_stake: Amount,

    // --- Proof of delivery --------------------------------------------------
    pub gps_accuracy_limit_m: f64,
    pub max_step_km: f64,
    pub t_drift_seconds: f64,
    /// Minimum driver reputation required to accept a contract.
    pub driver_reputation_threshold: f64,
    pub reward_split: RewardSplit,

    // --- Coordinate grid ----------------------------------------------------
    pub max_coordinate_ops_per_minute: u32,

    // --- Persistence --------------------------------------------------------
    pub segment_max_bytes: u64,

    // --- Genesis ------------------------------------------------------------
    pub genesis_wallets: u64,
    pub genesis_wallet_balance: Amount,
    /// Per-tx signature verification budget before the tx is dropped.
    pub signature_verify_timeout_ms: u64,
}

impl ChainConfig {
    /// Standard connected-mode preset.
    pub fn on_grid() -> Self {
        Self {
            mode: ChainMode::OnGrid,
            target_block_time_seconds: 30,
            block_size_cap_bytes: 1_048_576,
            tx_count_cap: 1000,
            difficulty_retarget_interval: 2016,
            initial_difficulty_bits: 16,
            base_block_reward: Amount::units(50),
            halving_interval_blocks: 420_480,
            max_supply: Amount::units(100_000_000),
            mempool_max_bytes: 268_435_456,
            mempool_nonce_gap: 16,
            rbf_min_bump_ppm: 100_000,
            committee_size: 21,
            epoch_blocks: 144,
            reorg_window: 6,
            proposal_timeout_seconds: 10,
            view_timeout_cap_factor: 8,
            validator_stake: Amount::units(10_000),
            gps_accuracy_limit_m: 10.0,
            max_step_km: 5.0,
            t_drift_seconds: 300.0,
            driver_reputation_threshold: 0.3,
            reward_split: RewardSplit::default(),
            max_coordinate_ops_per_minute: 100,
            segment_max_bytes: 128 * 1024 * 1024,
            genesis_wallets: 1000,
            genesis_wallet_balance: Amount::units(1000),
            signature_verify_timeout_ms: 50,
        }
    }

    /// Disconnected-mode preset: small blocks, slow cadence, no BFT quorum.
    pub fn off_grid() -> Self {
        Self {
            mode: ChainMode::OffGrid,
            target_block_time_seconds: 300,
            block_size_cap_bytes: 1_024,
            tx_count_cap: 10,
            difficulty_retarget_interval: 144,
            initial_difficulty_bits: 8,
            mempool_max_bytes: 262_144,
            ..Self::on_grid()
        }
    }

    /// True when blocks that finalize contracts require a BFT quorum.
    pub fn requires_bft(&self) -> bool {
        self.mode == ChainMode::OnGrid
    }

    /// Sanity-check operator-supplied values. A failure here is a
    /// configuration error (daemon exit code 1).
    pub fn validate(&self) -> Result<(), String> {
        if !self.reward_split.is_complete() {
            return Err("reward_split shares must sum to 1.0".into());
        }
        if self.tx_count_cap == 0 || self.block_size_cap_bytes == 0 {
            return Err("block caps must be positive".into());
        }
        if self.committee_size == 0 {
            return Err("committee_size must be positive".into());
        }
        if self.reorg_window == 0 {
            return Err("reorg_window must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.driver_reputation_threshold) {
            return Err("driver_reputation_threshold must be in [0, 1]".into());
        }
        if self.genesis_wallets == 0 {
            return Err("genesis_wallets must be positive".into());
        }
        Ok(())
    }

    /// Byzantine fault budget `f` for a committee of `3f + 1`.
    pub fn fault_budget(&self) -> usize {
        self.committee_size.saturating_sub(1) / 3
    }

    /// Quorum threshold: 2f + 1 of the registered committee.
    pub fn quorum_threshold(&self) -> usize {
        2 * self.fault_budget() + 1
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::on_grid()
    }
}
