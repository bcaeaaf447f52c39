//! Read snapshots handed out by the chain actor.
//!
//! A snapshot is a cheap clone of the account store plus the tip; readers
//! never observe a half-applied block. The snapshot implements the read
//! traits of the mempool and the block validator.

use lc_block::validator::StateView;
use lc_consensus::engine::ReputationView;
use lc_consensus::TipInfo;
use lc_mempool::AccountView;
use lc_wallet::WalletStore;
use shared_types::{Address, Amount};

/// Immutable view over committed state at one tip.
#[derive(Clone, Debug)]
pub struct ChainSnapshot {
    pub wallets: WalletStore,
    pub tip: TipInfo,
}

impl AccountView for ChainSnapshot {
    fn nonce(&self, address: &Address) -> u64 {
        self.wallets.nonce(address)
    }
}

impl StateView for ChainSnapshot {
    fn nonce(&self, address: &Address) -> u64 {
        self.wallets.nonce(address)
    }

    fn balance(&self, address: &Address) -> Amount {
        self.wallets.balance(address)
    }
}

impl ReputationView for ChainSnapshot {
    fn reputation(&self, address: &Address) -> f64 {
        self.wallets.reputation(address)
    }
}
