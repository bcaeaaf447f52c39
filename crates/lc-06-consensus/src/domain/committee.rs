//! Validator registry and committee rotation.
//!
//! Validators register with a stake and an Ed25519 key. At each epoch
//! boundary the top N by stake form the committee. A proposer caught
//! misbehaving is excluded for the remainder of the epoch.

use crate::errors::ConsensusError;
use serde::{Deserialize, Serialize};
use shared_crypto::signatures::verify_ed25519;
use shared_types::{Amount, Attestation, ChainConfig, Hash, ValidatorId};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// One registered validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: ValidatorId,
    /// Ed25519 attestation key.
    pub public_key: [u8; 32],
    pub stake: Amount,
    pub active: bool,
}

/// Stake-weighted validator set with epoch-based committee rotation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidatorRegistry {
    validators: HashMap<ValidatorId, ValidatorInfo>,
    committee: Vec<ValidatorId>,
    /// Validators excluded until the next rotation.
    excluded: HashSet<ValidatorId>,
    epoch: u64,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn committee(&self) -> &[ValidatorId] {
        &self.committee
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn get(&self, validator: &ValidatorId) -> Option<&ValidatorInfo> {
        self.validators.get(validator)
    }

    /// Register (or top up) a validator's stake.
    pub fn register(
        &mut self,
        address: ValidatorId,
        public_key: &[u8],
        stake: Amount,
        config: &ChainConfig,
    ) -> Result<(), ConsensusError> {
        let key: [u8; 32] = public_key
            .try_into()
            .map_err(|_| ConsensusError::BadValidatorKey)?;
        if stake < config.validator_stake {
            return Err(ConsensusError::InsufficientStake);
        }
        self.validators.insert(
            address,
            ValidatorInfo {
                address,
                public_key: key,
                stake,
                active: true,
            },
        );
        Ok(())
    }

    /// Exclude a misbehaving proposer until the next epoch rotation.
    pub fn exclude_for_epoch(&mut self, validator: &ValidatorId) {
        self.excluded.insert(*validator);
        self.committee.retain(|v| v != validator);
        info!(validator = ?&validator[..4], "validator excluded for the epoch");
    }

    /// Rotate the committee at an epoch boundary: top N by stake among the
    /// active, non-excluded validators, ordered by (stake desc, address).
    pub fn rotate(&mut self, height: u64, config: &ChainConfig) {
        if height % config.epoch_blocks != 0 {
            return;
        }
        self.epoch = height / config.epoch_blocks;
        self.excluded.clear();

        let mut candidates: Vec<&ValidatorInfo> =
            self.validators.values().filter(|v| v.active).collect();
        candidates.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.address.cmp(&b.address)));
        self.committee = candidates
            .into_iter()
            .take(config.committee_size)
            .map(|v| v.address)
            .collect();
        info!(
            epoch = self.epoch,
            committee = self.committee.len(),
            "committee rotated"
        );
    }

    /// Verify a quorum of attestations over a block hash.
    ///
    /// Counts distinct committee members with valid Ed25519 signatures;
    /// passes at ⌊2f⌋+1.
    pub fn verify_quorum(
        &self,
        block_hash: &Hash,
        attestations: &[Attestation],
        config: &ChainConfig,
    ) -> Result<(), ConsensusError> {
        let need = config.quorum_threshold();
        let mut seen: HashSet<ValidatorId> = HashSet::new();

        for att in attestations {
            if !self.committee.contains(&att.validator) {
                return Err(ConsensusError::NotInCommittee {
                    validator: att.validator,
                });
            }
            if !seen.insert(att.validator) {
                return Err(ConsensusError::DuplicateAttestation {
                    validator: att.validator,
                });
            }
            let info = self
                .validators
                .get(&att.validator)
                .ok_or(ConsensusError::NotInCommittee {
                    validator: att.validator,
                })?;
            verify_ed25519(&info.public_key, block_hash, &att.signature).map_err(|_| {
                ConsensusError::InvalidAttestation {
                    validator: att.validator,
                }
            })?;
        }

        if seen.len() < need {
            return Err(ConsensusError::QuorumInsufficient {
                got: seen.len(),
                need,
            });
        }
        Ok(())
    }
}
