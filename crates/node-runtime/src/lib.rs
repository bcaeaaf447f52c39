//! # Node Runtime - The LogiChain Core Daemon
//!
//! Wires the subsystem crates into the actor layout:
//!
//! - **Chain actor**: single writer over wallets, contracts, grid,
//!   validator registry and persistence; applies blocks serially and hands
//!   out copy-on-write snapshots for readers.
//! - **Mempool**: shared handle with non-blocking enqueue and a bundle
//!   pull for the assembler.
//! - **Consensus actor**: drives the BFT round on a monotonic clock.
//! - **Ingress**: the operations the out-of-scope HTTP layer calls.
//! - **Gossip seam**: signed envelopes handed to the network layer.
//!
//! All cross-actor traffic is bounded channels; a watch channel carries
//! shutdown, and actors unwind in reverse start order.

pub mod actors;
pub mod adapters;
pub mod chain;
pub mod config;
pub mod genesis;
pub mod gossip;
pub mod ingress;
pub mod miner;
pub mod offline;
pub mod snapshot;

pub use chain::{Chain, ChainError};
pub use config::NodeConfig;
pub use ingress::CoreHandle;
pub use snapshot::ChainSnapshot;

/// Daemon exit codes.
pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const PERSISTENCE_CORRUPT: i32 = 2;
    pub const INCOMPATIBLE_GENESIS: i32 = 3;
}
