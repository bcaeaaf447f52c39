//! # Shared Types - Core LogiChain Entities
//!
//! Defines the entities shared across every subsystem crate.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockHeader`, `Transaction`, `Attestation`
//! - **Logistics**: `Contract`, `Checkpoint`, `GeoPoint`, `CargoManifest`
//! - **State**: `Account`, `Amount`
//! - **Plumbing**: `CoreError`, `ChainConfig`, wire codec
//!
//! Cross-subsystem rules: no entity here owns behavior that belongs to a
//! subsystem; subsystems exchange these types through the shared bus and
//! the chain actor only.

pub mod amount;
pub mod codec;
pub mod config;
pub mod entities;
pub mod errors;

pub use amount::Amount;
pub use config::{ChainConfig, ChainMode, RewardSplit};
pub use entities::{
    Account, AccountStatus, Attestation, Block, BlockHeader, CargoManifest, Checkpoint, Contract,
    ContractState, GeoPoint, GossipMessage, GossipType, Hash, PublicKeyBytes, RoleMetrics,
    SensorReadings, Signature, Transaction, TxType, ValidatorId,
};
pub use errors::CoreError;

/// Protocol version carried in block and transaction wire encodings.
pub const PROTOCOL_VERSION: u32 = 1;

/// Address length in bytes: 3-byte human prefix + 20 bytes of key material.
pub const ADDRESS_LEN: usize = 23;

/// Human-readable address prefix.
pub const ADDRESS_PREFIX: &[u8; 3] = b"LGC";

/// Initial gossip message time-to-live.
pub const GOSSIP_TTL: u8 = 3;

/// A 23-byte account address (`LGC` + last 20 bytes of SHA-256(pubkey)).
pub type Address = [u8; ADDRESS_LEN];

/// The all-zero address used by coinbase rows and unset fields.
pub const ZERO_ADDRESS: Address = [0u8; ADDRESS_LEN];

/// The network reserve account receiving the reserve share of delivery
/// payouts: the `LGC` prefix over otherwise-zero key material.
pub const RESERVE_ADDRESS: Address = {
    let mut address = [0u8; ADDRESS_LEN];
    address[0] = b'L';
    address[1] = b'G';
    address[2] = b'C';
    address
};
