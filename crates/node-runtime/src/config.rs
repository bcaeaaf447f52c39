//! Node configuration: chain parameters plus daemon-level settings.

use serde::{Deserialize, Serialize};
use shared_types::{ChainConfig, ChainMode};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Unreadable(String),

    #[error("config file malformed: {0}")]
    Malformed(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration. The chain section starts from the mode preset and
/// applies explicit overrides on top.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    /// Mining is enabled when a payout address is configured.
    pub miner_address: Option<String>,
    pub chain: ChainConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
            miner_address: None,
            chain: ChainConfig::on_grid(),
        }
    }
}

/// The JSON shape operators write; everything is optional over the preset.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    log_level: Option<String>,
    miner_address: Option<String>,
    mode: Option<String>,
    committee_size: Option<usize>,
    epoch_blocks: Option<u64>,
    reorg_window: Option<u64>,
    genesis_wallets: Option<u64>,
    initial_difficulty_bits: Option<u32>,
}

impl NodeConfig {
    /// Load and validate a config file. Any failure here maps to daemon
    /// exit code 1.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Unreadable(e.to_string()))?;
        let file: ConfigFile =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let mut chain = match file.mode.as_deref() {
            None | Some("ON_GRID") => ChainConfig::on_grid(),
            Some("OFF_GRID") => ChainConfig::off_grid(),
            Some(other) => {
                return Err(ConfigError::Invalid(format!("unknown mode {other:?}")));
            }
        };
        if let Some(value) = file.committee_size {
            chain.committee_size = value;
        }
        if let Some(value) = file.epoch_blocks {
            chain.epoch_blocks = value;
        }
        if let Some(value) = file.reorg_window {
            chain.reorg_window = value;
        }
        if let Some(value) = file.genesis_wallets {
            chain.genesis_wallets = value;
        }
        if let Some(value) = file.initial_difficulty_bits {
            chain.initial_difficulty_bits = value;
        }
        chain.validate().map_err(ConfigError::Invalid)?;

        if let Some(address) = &file.miner_address {
            shared_crypto::parse_address(address)
                .map_err(|e| ConfigError::Invalid(format!("miner_address: {e}")))?;
        }

        Ok(Self {
            data_dir: file.data_dir.unwrap_or_else(|| PathBuf::from("./data")),
            log_level: file.log_level.unwrap_or_else(|| "info".into()),
            miner_address: file.miner_address,
            chain,
        })
    }

    pub fn mode(&self) -> ChainMode {
        self.chain.mode
    }
}
