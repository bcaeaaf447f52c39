//! # Contract Registry
//!
//! Owns every contract's state. Mutations happen only while the chain actor
//! applies a validated block; each returns a [`StateChange`] carrying the
//! prior value so a reorg can restore it.

use crate::domain::errors::ContractError;
use crate::domain::machine::{checkpoint_outcome, CheckpointOutcome};
use crate::domain::payloads::{AcceptPayload, ContractCreatePayload};
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainConfig, Checkpoint, Contract, ContractState, Hash};
use std::collections::HashMap;
use tracing::debug;

/// One applied transition, with everything needed to undo it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub contract_id: Hash,
    pub from: ContractState,
    pub to: ContractState,
    /// Contract value before the mutation; `None` when it was created.
    pub prior: Option<Contract>,
}

/// All contracts, indexed by id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContractRegistry {
    contracts: HashMap<Hash, Contract>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn get(&self, contract_id: &Hash) -> Option<&Contract> {
        self.contracts.get(contract_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &Contract)> {
        self.contracts.iter()
    }

    /// CONTRACT_CREATE applied: DRAFT → OPEN.
    pub fn create(
        &mut self,
        contract_id: Hash,
        creator: Address,
        payload: &ContractCreatePayload,
        height: u64,
        block_time: f64,
    ) -> Result<StateChange, ContractError> {
        if self.contracts.contains_key(&contract_id) {
            return Err(ContractError::DuplicateContract { contract_id });
        }
        if !payload.pickup.in_range() || !payload.delivery.in_range() {
            return Err(ContractError::InvalidCoordinates);
        }
        if payload.tolerance_radius_m <= 0.0 || payload.escrow.is_negative() {
            return Err(ContractError::MalformedPayload {
                detail: "non-positive tolerance or negative escrow".into(),
            });
        }
        if payload.expires_at <= block_time {
            return Err(ContractError::Expired { contract_id });
        }

        let contract = Contract {
            id: contract_id,
            creator,
            driver: None,
            driver_key: None,
            pickup: payload.pickup,
            delivery: payload.delivery,
            tolerance_radius_m: payload.tolerance_radius_m,
            max_error_m: payload.max_error_m,
            cargo: payload.cargo.clone(),
            escrow: payload.escrow,
            expires_at: payload.expires_at,
            state: ContractState::Open,
            checkpoints: Vec::new(),
            created_height: height,
        };
        self.contracts.insert(contract_id, contract);
        debug!(id = ?&contract_id[..4], "contract opened");

        Ok(StateChange {
            contract_id,
            from: ContractState::Draft,
            to: ContractState::Open,
            prior: None,
        })
    }

    /// CONTRACT_ACCEPT applied: OPEN → ACCEPTED.
    pub fn accept(
        &mut self,
        driver: Address,
        driver_reputation: f64,
        payload: &AcceptPayload,
        config: &ChainConfig,
    ) -> Result<StateChange, ContractError> {
        let contract = self.get_mut(&payload.contract_id)?;
        if contract.state != ContractState::Open {
            return Err(ContractError::IllegalTransition {
                from: contract.state,
                to: ContractState::Accepted,
            });
        }
        if driver_reputation < config.driver_reputation_threshold {
            return Err(ContractError::ReputationTooLow {
                reputation: driver_reputation,
                threshold: config.driver_reputation_threshold,
            });
        }
        if payload.checkpoint_key.len() != 32 {
            return Err(ContractError::MalformedPayload {
                detail: "checkpoint key must be 32 bytes of Ed25519".into(),
            });
        }

        let prior = contract.clone();
        contract.driver = Some(driver);
        contract.driver_key = Some(payload.checkpoint_key.clone());
        contract.state = ContractState::Accepted;

        Ok(StateChange {
            contract_id: payload.contract_id,
            from: ContractState::Open,
            to: ContractState::Accepted,
            prior: Some(prior),
        })
    }

    /// CONTRACT_CHECKPOINT applied. The sender must be the assigned driver.
    pub fn apply_checkpoint(
        &mut self,
        contract_id: Hash,
        sender: Address,
        cp: Checkpoint,
        ingest_time: f64,
        config: &ChainConfig,
    ) -> Result<(StateChange, CheckpointOutcome), ContractError> {
        let contract = self.get_mut(&contract_id)?;
        if contract.driver != Some(sender) {
            return Err(ContractError::NotTheDriver);
        }
        if ingest_time > contract.expires_at {
            return Err(ContractError::Expired { contract_id });
        }

        let outcome = checkpoint_outcome(contract, &cp, ingest_time, config)?;
        let prior = contract.clone();
        let from = contract.state;
        contract.checkpoints.push(cp);
        contract.state = match outcome {
            CheckpointOutcome::EnteredTransit | CheckpointOutcome::Progressed => {
                ContractState::InTransit
            }
            CheckpointOutcome::Delivered => ContractState::Delivered,
        };

        Ok((
            StateChange {
                contract_id,
                from,
                to: contract.state,
                prior: Some(prior),
            },
            outcome,
        ))
    }

    /// CONTRACT_FINALIZE applied under a valid quorum: DELIVERED → VALIDATED.
    /// The quorum itself is checked by consensus before this runs.
    pub fn finalize(&mut self, contract_id: Hash) -> Result<(StateChange, Contract), ContractError> {
        let contract = self.get_mut(&contract_id)?;
        if contract.state != ContractState::Delivered {
            return Err(ContractError::IllegalTransition {
                from: contract.state,
                to: ContractState::Validated,
            });
        }
        let prior = contract.clone();
        contract.state = ContractState::Validated;
        let validated = contract.clone();

        Ok((
            StateChange {
                contract_id,
                from: ContractState::Delivered,
                to: ContractState::Validated,
                prior: Some(prior),
            },
            validated,
        ))
    }

    /// CONTRACT_DISPUTE applied: any non-terminal state freezes.
    pub fn dispute(
        &mut self,
        contract_id: Hash,
        sender: Address,
    ) -> Result<StateChange, ContractError> {
        let contract = self.get_mut(&contract_id)?;
        if contract.state.is_terminal() {
            return Err(ContractError::IllegalTransition {
                from: contract.state,
                to: ContractState::Disputed,
            });
        }
        if sender != contract.creator && contract.driver != Some(sender) {
            return Err(ContractError::NotTheDriver);
        }
        let prior = contract.clone();
        let from = contract.state;
        contract.state = ContractState::Disputed;

        Ok(StateChange {
            contract_id,
            from,
            to: ContractState::Disputed,
            prior: Some(prior),
        })
    }

    /// Expire every non-terminal contract whose deadline has passed.
    /// Runs at the start of each block application.
    pub fn expire_sweep(&mut self, block_time: f64) -> Vec<StateChange> {
        let mut changes = Vec::new();
        for contract in self.contracts.values_mut() {
            if !contract.state.is_terminal() && block_time > contract.expires_at {
                let prior = contract.clone();
                let from = contract.state;
                contract.state = ContractState::Expired;
                changes.push(StateChange {
                    contract_id: contract.id,
                    from,
                    to: ContractState::Expired,
                    prior: Some(prior),
                });
            }
        }
        changes
    }

    /// Reorg undo: put a contract back to its prior value, or remove a
    /// creation.
    pub fn restore(&mut self, contract_id: Hash, prior: Option<Contract>) {
        match prior {
            Some(contract) => {
                self.contracts.insert(contract_id, contract);
            }
            None => {
                self.contracts.remove(&contract_id);
            }
        }
    }

    fn get_mut(&mut self, contract_id: &Hash) -> Result<&mut Contract, ContractError> {
        self.contracts
            .get_mut(contract_id)
            .ok_or(ContractError::UnknownContract {
                contract_id: *contract_id,
            })
    }
}
