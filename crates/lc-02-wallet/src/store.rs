//! The account store.

use crate::{REPUTATION_EXPIRY_WEIGHT, REPUTATION_SUCCESS_WEIGHT};
use serde::{Deserialize, Serialize};
use shared_types::{Account, Address, Amount};
use std::collections::HashMap;
use thiserror::Error;

/// Account mutation failures.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum WalletError {
    #[error("unknown account")]
    UnknownAccount { address: Address },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("invalid nonce: expected {expected}, got {actual}")]
    InvalidNonce { expected: u64, actual: u64 },

    #[error("amount arithmetic overflow")]
    Overflow,
}

/// Address → account map owned by the chain actor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WalletStore {
    accounts: HashMap<Address, Account>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Fetch or lazily create an account. New accounts start empty with a
    /// neutral 0.5 reputation.
    pub fn get_or_create(&mut self, address: Address, now: f64) -> &mut Account {
        self.accounts.entry(address).or_insert_with(|| Account::new(now))
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.accounts
            .get(address)
            .map(|a| a.balance)
            .unwrap_or(Amount::ZERO)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn reputation(&self, address: &Address) -> f64 {
        self.accounts
            .get(address)
            .map(|a| a.reputation)
            .unwrap_or(0.5)
    }

    /// Credit an account, creating it if needed.
    pub fn credit(&mut self, address: Address, amount: Amount, now: f64) -> Result<(), WalletError> {
        let account = self.get_or_create(address, now);
        account.balance = account
            .balance
            .checked_add(amount)
            .map_err(|_| WalletError::Overflow)?;
        Ok(())
    }

    /// Debit an existing account; the balance may not go negative.
    pub fn debit(&mut self, address: &Address, amount: Amount) -> Result<(), WalletError> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or(WalletError::UnknownAccount { address: *address })?;
        if account.balance < amount {
            return Err(WalletError::InsufficientBalance {
                required: amount,
                available: account.balance,
            });
        }
        account.balance = account
            .balance
            .checked_sub(amount)
            .map_err(|_| WalletError::Overflow)?;
        Ok(())
    }

    /// Check and advance a sender's nonce. The next valid nonce is always
    /// `stored + 1`, keeping per-sender sequences contiguous.
    pub fn advance_nonce(&mut self, address: &Address, tx_nonce: u64) -> Result<(), WalletError> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or(WalletError::UnknownAccount { address: *address })?;
        let expected = account.nonce + 1;
        if tx_nonce != expected {
            return Err(WalletError::InvalidNonce {
                expected,
                actual: tx_nonce,
            });
        }
        account.nonce = tx_nonce;
        Ok(())
    }

    /// Pull a driver's reputation toward 1.0 after a validated delivery and
    /// update their delivery metrics.
    pub fn record_delivery_success(&mut self, address: &Address, revenue: Amount, now: f64) {
        let account = self.get_or_create(*address, now);
        account.reputation += REPUTATION_SUCCESS_WEIGHT * (1.0 - account.reputation);
        account.metrics.deliveries += 1;
        account.metrics.completed_contracts += 1;
        account.metrics.revenue = account.metrics.revenue.saturating_add(revenue);
    }

    /// Pull a driver's reputation toward 0.0 after an expiry on their watch.
    pub fn record_delivery_failure(&mut self, address: &Address, now: f64) {
        let account = self.get_or_create(*address, now);
        account.reputation -= REPUTATION_EXPIRY_WEIGHT * account.reputation;
    }

    /// Small reputation decrement for consensus misbehavior (silent
    /// proposer, invalid proposal).
    pub fn record_validator_fault(&mut self, address: &Address, now: f64) {
        let account = self.get_or_create(*address, now);
        account.reputation -= 0.1 * account.reputation;
    }

    /// Sum of all balances, for the supply conservation check.
    pub fn total_balance(&self) -> Amount {
        self.accounts.values().map(|a| a.balance).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Replace one account wholesale (reorg undo path).
    pub fn restore(&mut self, address: Address, account: Option<Account>) {
        match account {
            Some(account) => {
                self.accounts.insert(address, account);
            }
            None => {
                self.accounts.remove(&address);
            }
        }
    }
}
