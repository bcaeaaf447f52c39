//! # The Chain
//!
//! Single-writer owner of the canonical state: wallets, contracts, the
//! coordinate grid, the validator registry and persistence. Blocks are
//! applied serially and atomically; every mutation is captured in an undo
//! record before it lands, so a reorg inside the window can walk back.
//!
//! Fork handling: side blocks accumulate until a competing tip carries more
//! cumulative work, then the disjoint suffix is undone and the new suffix
//! applied under full validation. If any step of that fails the in-memory
//! snapshot taken at the start of the reorg is restored. Forks beyond the
//! reorg window are refused and surfaced as suspect.

use crate::genesis::{genesis_allocations, genesis_block, genesis_hash};
use crate::snapshot::ChainSnapshot;
use lc_block::difficulty::work_for_bits;
use lc_block::reward::block_reward;
use lc_consensus::engine::{apply_contract_ops, ContractEffects, HybridEngine};
use lc_consensus::{better_tip, check_reorg_depth, ConsensusError, TipInfo, ValidatorRegistry};
use lc_contracts::{ContractRegistry, StateChange};
use lc_coordinate_grid::{CoordinateGrid, GridError};
use lc_storage::{BlockLocation, ChainStore, KeyValueStore, StorageError, StoredTip, UndoRecord};
use lc_telemetry::metrics;
use lc_wallet::{WalletError, WalletStore};
use primitive_types::U256;
use shared_bus::ChainEvent;
use shared_crypto::{block_hash, tx_hash};
use shared_types::{
    Account, Address, Amount, Block, BlockHeader, ChainConfig, Contract, ContractState, Hash,
    TxType, RESERVE_ADDRESS,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block application halted after persistence failure")]
    Halted,

    #[error("incompatible genesis: stored chain was created with different parameters")]
    IncompatibleGenesis,

    #[error("unknown parent block")]
    ParentUnknown { parent_hash: Hash },

    #[error("transaction replayed")]
    ReplayDetected { tx_hash: Hash },

    #[error("coordinate cell saturated at ({lat}, {lng})")]
    CoordinateSaturated { lat: i16, lng: i16 },

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("state inconsistency: {0}")]
    Inconsistency(String),
}

/// Tip parameters for candidate assembly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MiningParams {
    pub parent_hash: Hash,
    pub parent_height: u64,
    pub parent_timestamp: f64,
    pub difficulty_bits: u32,
}

/// What one applied block produced, for the actor to fan out.
#[derive(Debug, Default)]
pub struct Applied {
    pub events: Vec<ChainEvent>,
    /// Hashes of transactions now committed (mempool pruning).
    pub included: Vec<Hash>,
    /// False when the block was parked as a side block or refused.
    pub extended_chain: bool,
}

/// The chain state machine.
pub struct Chain<KV: KeyValueStore> {
    config: ChainConfig,
    engine: HybridEngine,
    wallets: WalletStore,
    contracts: ContractRegistry,
    grid: CoordinateGrid,
    validators: ValidatorRegistry,
    store: ChainStore<KV>,
    issued: Amount,
    tip: TipInfo,
    /// Known headers (canonical and side) with their cumulative work.
    headers: HashMap<Hash, (BlockHeader, U256)>,
    /// Full bodies of side-chain blocks pending a possible reorg.
    side_blocks: HashMap<Hash, Block>,
    /// During startup replay: blocks already in the segments, keyed by hash,
    /// whose index rows are rebuilt in place instead of re-appending.
    reindex_locations: HashMap<Hash, BlockLocation>,
    halted: bool,
}

impl<KV: KeyValueStore> Chain<KV> {
    /// Bootstrap from storage, seeding genesis on first run. A stored
    /// genesis that disagrees with the configuration is fatal (exit 3).
    pub fn bootstrap(config: ChainConfig, store: ChainStore<KV>) -> Result<Self, ChainError> {
        let expected_genesis = genesis_hash(&config);

        match store.genesis_hash()? {
            Some(stored) if stored != expected_genesis => Err(ChainError::IncompatibleGenesis),
            Some(_) if store.is_consistent() => Self::resume(config, store),
            Some(_) => Self::replay(config, store),
            None => Self::initialize(config, store),
        }
    }

    /// Bare chain at genesis state, persistence untouched.
    fn at_genesis(config: ChainConfig, store: ChainStore<KV>) -> Result<Self, ChainError> {
        let block = genesis_block(&config);
        let hash = genesis_hash(&config);
        let mut wallets = WalletStore::new();
        let mut issued = Amount::ZERO;
        for (address, balance) in genesis_allocations(&config) {
            wallets.credit(address, balance, block.header.timestamp)?;
            issued = issued.saturating_add(balance);
        }

        let work = work_for_bits(block.header.difficulty);
        let mut headers = HashMap::new();
        headers.insert(hash, (block.header.clone(), work));

        Ok(Self {
            engine: HybridEngine::new(config.clone()),
            grid: CoordinateGrid::new(config.max_coordinate_ops_per_minute),
            config,
            wallets,
            contracts: ContractRegistry::new(),
            validators: ValidatorRegistry::new(),
            store,
            issued,
            tip: TipInfo {
                hash,
                height: 0,
                cumulative_work: work,
                finalized_height: 0,
            },
            headers,
            side_blocks: HashMap::new(),
            reindex_locations: HashMap::new(),
            halted: false,
        })
    }

    fn initialize(config: ChainConfig, store: ChainStore<KV>) -> Result<Self, ChainError> {
        let mut chain = Self::at_genesis(config, store)?;
        let block = genesis_block(&chain.config);
        let hash = chain.tip.hash;
        chain.persist_genesis(&block, hash, None)?;
        info!(wallets = chain.config.genesis_wallets, "genesis initialized");
        Ok(chain)
    }

    fn persist_genesis(
        &mut self,
        block: &Block,
        hash: Hash,
        location: Option<BlockLocation>,
    ) -> Result<(), ChainError> {
        let touched: Vec<(Address, Account)> = self
            .wallets
            .iter()
            .map(|(address, account)| (*address, account.clone()))
            .collect();
        let undo = UndoRecord {
            height: 0,
            block_hash: hash,
            accounts: Vec::new(),
            contracts: Vec::new(),
            issued_before: Amount::ZERO,
        };
        let tip = StoredTip {
            hash,
            height: 0,
            work_be: work_to_be(self.tip.cumulative_work),
        };
        match location {
            Some(location) => self.store.reindex_block(
                block,
                hash,
                location,
                &undo,
                &touched,
                &[],
                self.issued,
                tip,
            )?,
            None => {
                self.store
                    .append_block(block, hash, &undo, &touched, &[], self.issued, tip)?;
            }
        }
        self.store.set_genesis(hash)?;
        Ok(())
    }

    fn resume(config: ChainConfig, store: ChainStore<KV>) -> Result<Self, ChainError> {
        let stored_tip = store.tip()?.ok_or(StorageError::IndexCorruption {
            detail: "consistent store without a tip".into(),
        })?;

        let mut wallets = WalletStore::new();
        for (address, account) in store.load_accounts()? {
            wallets.restore(address, Some(account));
        }
        let mut contracts = ContractRegistry::new();
        for (id, contract) in store.load_contracts()? {
            contracts.restore(id, Some(contract));
        }
        let issued = store.issued()?;

        // Rebuild recent headers (the reorg window plus one) for fork choice.
        let mut headers = HashMap::new();
        let mut cumulative = U256::from_big_endian(&stored_tip.work_be);
        let from = stored_tip.height.saturating_sub(config.reorg_window);
        for height in (from..=stored_tip.height).rev() {
            let Some(block) = store.block_by_height(height)? else {
                break;
            };
            let hash = block_hash(&block.header);
            headers.insert(hash, (block.header.clone(), cumulative));
            cumulative = cumulative.saturating_sub(work_for_bits(block.header.difficulty));
        }

        info!(height = stored_tip.height, "chain resumed from storage");
        Ok(Self {
            engine: HybridEngine::new(config.clone()),
            grid: CoordinateGrid::new(config.max_coordinate_ops_per_minute),
            config,
            wallets,
            contracts,
            validators: ValidatorRegistry::new(),
            store,
            issued,
            tip: TipInfo {
                hash: stored_tip.hash,
                height: stored_tip.height,
                cumulative_work: U256::from_big_endian(&stored_tip.work_be),
                finalized_height: 0,
            },
            headers,
            side_blocks: HashMap::new(),
            reindex_locations: HashMap::new(),
            halted: false,
        })
    }

    /// The manifest disagrees with the index: rebuild everything by
    /// re-applying the segment contents in write order.
    fn replay(config: ChainConfig, store: ChainStore<KV>) -> Result<Self, ChainError> {
        warn!("manifest inconsistent, replaying segments to rebuild the index");
        let records = store.replay_records()?;
        if records.is_empty() {
            return Self::initialize(config, store);
        }

        let mut chain = Self::at_genesis(config, store)?;
        let genesis = genesis_block(&chain.config);
        let genesis_id = chain.tip.hash;
        let (genesis_location, _) = &records[0];
        chain.persist_genesis(&genesis, genesis_id, Some(*genesis_location))?;

        for (location, block) in &records[1..] {
            chain
                .reindex_locations
                .insert(block_hash(&block.header), *location);
        }
        for (_, mut block) in records.into_iter().skip(1) {
            block.header.height = 0;
            if let Err(e) = chain.apply_block(block, f64::MAX) {
                // Stale side blocks of abandoned forks are expected here.
                warn!(error = %e, "stored block skipped during replay");
            }
        }
        chain.reindex_locations.clear();
        info!(height = chain.tip.height, "index rebuilt from segments");
        Ok(chain)
    }

    // -------------------------------------------------------------------------
    // QUERIES
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn tip(&self) -> TipInfo {
        self.tip
    }

    pub fn tip_header(&self) -> &BlockHeader {
        &self.headers[&self.tip.hash].0
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.wallets.get(address)
    }

    pub fn contract(&self, id: &Hash) -> Option<&Contract> {
        self.contracts.get(id)
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    pub fn issued(&self) -> Amount {
        self.issued
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.store.block_by_height(height)?)
    }

    pub fn tx_is_committed(&self, hash: &Hash) -> Result<bool, ChainError> {
        Ok(self.store.tx_location(hash)?.is_some())
    }

    /// Difficulty for the next block: carry-over off the retarget boundary,
    /// clamped adjustment on it.
    pub fn next_difficulty_bits(&self) -> u32 {
        let tip_header = self.tip_header();
        let next_height = self.tip.height + 1;
        let interval = self.config.difficulty_retarget_interval;
        if next_height % interval != 0 {
            return tip_header.difficulty;
        }
        let start_height = next_height - interval;
        let interval_start = self
            .store
            .block_by_height(start_height)
            .ok()
            .flatten()
            .map(|b| b.header.timestamp)
            .unwrap_or(tip_header.timestamp);
        lc_block::difficulty::next_difficulty(
            tip_header.difficulty,
            next_height,
            interval_start,
            tip_header.timestamp,
            &self.config,
        )
    }

    /// Everything the assembler needs to build on the current tip.
    pub fn mining_params(&self) -> MiningParams {
        MiningParams {
            parent_hash: self.tip.hash,
            parent_height: self.tip.height,
            parent_timestamp: self.tip_header().timestamp,
            difficulty_bits: self.next_difficulty_bits(),
        }
    }

    /// Copy-on-write snapshot for readers and the mempool.
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            wallets: self.wallets.clone(),
            tip: self.tip,
        }
    }

    /// Escrow still locked in live contracts, for conservation checks.
    /// Expired contracts refunded their escrow; validated ones paid it out.
    pub fn total_escrowed(&self) -> Amount {
        self.contracts
            .iter()
            .filter(|(_, c)| !matches!(c.state, ContractState::Validated | ContractState::Expired))
            .map(|(_, c)| c.escrow)
            .sum()
    }

    pub fn total_balances(&self) -> Amount {
        self.wallets.total_balance()
    }

    // -------------------------------------------------------------------------
    // VALIDATOR MANAGEMENT
    // -------------------------------------------------------------------------

    /// Out-of-band validator registration (genesis configuration or the
    /// operator API). The committee reforms immediately; stake-ordering and
    /// the size cap are applied by the rotation.
    pub fn register_validator(
        &mut self,
        address: Address,
        public_key: &[u8],
        stake: Amount,
    ) -> Result<(), ChainError> {
        self.validators
            .register(address, public_key, stake, &self.config)?;
        self.validators.rotate(0, &self.config);
        Ok(())
    }

    /// A proposer went silent or equivocated: reputation down, excluded for
    /// the remainder of the epoch.
    pub fn record_validator_fault(&mut self, validator: &Address, now: f64) {
        self.wallets.record_validator_fault(validator, now);
        self.validators.exclude_for_epoch(validator);
    }

    // -------------------------------------------------------------------------
    // BLOCK APPLICATION
    // -------------------------------------------------------------------------

    /// Apply a block: extends the tip directly, or feeds fork handling.
    pub fn apply_block(&mut self, mut block: Block, now: f64) -> Result<Applied, ChainError> {
        if self.halted {
            return Err(ChainError::Halted);
        }

        if block.header.parent_hash == self.tip.hash {
            if block.header.height == 0 {
                block.header.height = self.tip.height + 1;
            }
            self.apply_to_tip(block, now)
        } else {
            self.consider_fork(block, now)
        }
    }

    fn apply_to_tip(&mut self, block: Block, now: f64) -> Result<Applied, ChainError> {
        let hash = block_hash(&block.header);
        let parent = self.headers[&self.tip.hash].0.clone();
        let snapshot = self.snapshot();

        // The declared difficulty must be the retarget-scheduled one; a
        // miner cannot pick its own target.
        let expected_bits = self.next_difficulty_bits();
        if block.header.difficulty != expected_bits {
            return Err(ChainError::Consensus(ConsensusError::BlockInvalid(
                lc_block::BlockError::PoWTargetMissed {
                    got: block.header.difficulty,
                    need: expected_bits,
                },
            )));
        }

        // All three consensus gates.
        self.engine.validate_block(
            &block,
            &parent,
            &snapshot,
            &snapshot,
            &self.contracts,
            &self.validators,
            now,
        )?;

        // Replay guard against already-committed transactions.
        for tx in &block.transactions {
            let id = tx_hash(tx);
            if self.store.tx_location(&id)?.is_some() {
                return Err(ChainError::ReplayDetected { tx_hash: id });
            }
        }

        // Contract transitions first; their priors are the contract undo.
        let effects = apply_contract_ops(&mut self.contracts, &block, &snapshot, &self.config)
            .map_err(ConsensusError::PodRejected)?;

        // Grid operations. Saturation rejects the block; contract mutations
        // roll back from the captured priors.
        if let Err(err) = self.apply_grid_ops(&block, &effects) {
            self.undo_contract_changes(&effects.changes);
            return Err(err);
        }

        // Wallet mutations, with account priors captured on first touch.
        let mut account_priors: HashMap<Address, Option<Account>> = HashMap::new();
        let issued_before = self.issued;
        if let Err(err) = self.apply_wallet_ops(&block, &effects, &mut account_priors) {
            self.restore_accounts(&account_priors);
            self.undo_contract_changes(&effects.changes);
            self.issued = issued_before;
            return Err(err);
        }

        // Committee rotation at epoch boundaries.
        self.validators.rotate(block.header.height, &self.config);

        // Persist. The store retries once internally; a definitive failure
        // halts the chain on the last-good state.
        let undo = UndoRecord {
            height: block.header.height,
            block_hash: hash,
            accounts: account_priors
                .iter()
                .map(|(address, prior)| (*address, prior.clone()))
                .collect(),
            contracts: contract_priors(&effects.changes),
            issued_before,
        };
        let touched_accounts: Vec<(Address, Account)> = account_priors
            .keys()
            .filter_map(|address| {
                self.wallets
                    .get(address)
                    .map(|account| (*address, account.clone()))
            })
            .collect();
        let touched_contracts: Vec<(Hash, Contract)> = effects
            .changes
            .iter()
            .filter_map(|change| {
                self.contracts
                    .get(&change.contract_id)
                    .map(|c| (change.contract_id, c.clone()))
            })
            .collect();

        let work = self.tip.cumulative_work + work_for_bits(block.header.difficulty);
        // Attestation sets are only verified under the ON_GRID quorum gate;
        // OFF_GRID blocks never advance finality.
        let has_quorum = self.config.requires_bft() && !block.attestations.is_empty();
        let stored_tip = StoredTip {
            hash,
            height: block.header.height,
            work_be: work_to_be(work),
        };

        let persisted = match self.reindex_locations.get(&hash).copied() {
            Some(location) => self
                .store
                .reindex_block(
                    &block,
                    hash,
                    location,
                    &undo,
                    &touched_accounts,
                    &touched_contracts,
                    self.issued,
                    stored_tip,
                )
                .map(|_| ()),
            None => self
                .store
                .append_block(
                    &block,
                    hash,
                    &undo,
                    &touched_accounts,
                    &touched_contracts,
                    self.issued,
                    stored_tip,
                )
                .map(|_| ()),
        };
        if let Err(err) = persisted {
            self.restore_accounts(&account_priors);
            self.undo_contract_changes(&effects.changes);
            self.issued = issued_before;
            if matches!(err, StorageError::Fatal { .. }) {
                self.halted = true;
                return Ok(Applied {
                    events: vec![ChainEvent::FatalPersistence {
                        detail: err.to_string(),
                    }],
                    included: Vec::new(),
                    extended_chain: false,
                });
            }
            return Err(err.into());
        }

        // Commit the new tip.
        self.headers.insert(hash, (block.header.clone(), work));
        self.tip = TipInfo {
            hash,
            height: block.header.height,
            cumulative_work: work,
            finalized_height: if has_quorum {
                block.header.height
            } else {
                self.tip.finalized_height
            },
        };
        metrics::BLOCKS_APPENDED.inc();
        metrics::CHAIN_HEIGHT.set(block.header.height as f64);

        let mut events = vec![ChainEvent::BlockAppended {
            height: block.header.height,
            block_hash: hash,
            tx_count: block.transactions.len(),
            miner: block.header.miner,
        }];
        for change in &effects.changes {
            if change.to == ContractState::Validated {
                metrics::CONTRACTS_VALIDATED.inc();
            }
            events.push(ChainEvent::ContractStateChanged {
                contract_id: change.contract_id,
                from: change.from,
                to: change.to,
                block_hash: hash,
            });
        }

        info!(
            height = block.header.height,
            txs = block.transactions.len(),
            "block appended"
        );
        Ok(Applied {
            included: block.transactions.iter().map(tx_hash).collect(),
            events,
            extended_chain: true,
        })
    }

    fn apply_grid_ops(
        &mut self,
        block: &Block,
        effects: &ContractEffects,
    ) -> Result<(), ChainError> {
        let block_time = block.header.timestamp;
        for change in &effects.changes {
            let Some(contract) = self.contracts.get(&change.contract_id) else {
                continue;
            };
            let contract = contract.clone();
            match change.to {
                ContractState::Open => {
                    map_grid(self.grid.contract_opened(contract.pickup, block_time))?;
                }
                ContractState::Accepted => {
                    map_grid(self.grid.record_operation(contract.pickup, block_time))?;
                }
                ContractState::InTransit | ContractState::Delivered => {
                    if let Some(cp) = contract.last_checkpoint() {
                        map_grid(self.grid.record_operation(cp.position, block_time))?;
                    }
                }
                ContractState::Validated => {
                    let duration = delivery_duration(&contract);
                    map_grid(self.grid.contract_closed(
                        contract.delivery,
                        true,
                        duration,
                        block_time,
                    ))?;
                }
                ContractState::Expired => {
                    map_grid(
                        self.grid
                            .contract_closed(contract.pickup, false, 0.0, block_time),
                    )?;
                }
                ContractState::Draft | ContractState::Disputed => {}
            }
        }
        Ok(())
    }

    fn apply_wallet_ops(
        &mut self,
        block: &Block,
        effects: &ContractEffects,
        priors: &mut HashMap<Address, Option<Account>>,
    ) -> Result<(), ChainError> {
        let block_time = block.header.timestamp;
        let height = block.header.height;

        for tx in &block.transactions {
            match tx.tx_type {
                TxType::MiningReward => {
                    let miner = tx.to.ok_or_else(|| {
                        ChainError::Inconsistency("validated reward lost its recipient".into())
                    })?;
                    self.capture_prior(priors, &miner);
                    self.wallets.credit(miner, tx.amount, block_time)?;
                    // Only the scheduled emission is newly issued; the fee
                    // component moved from the senders.
                    self.issued = self
                        .issued
                        .saturating_add(block_reward(height, &self.config));
                }
                TxType::Transfer => {
                    let from = tx.sender();
                    let to = tx.to.ok_or_else(|| {
                        ChainError::Inconsistency("validated transfer lost its recipient".into())
                    })?;
                    self.capture_prior(priors, &from);
                    self.capture_prior(priors, &to);
                    self.wallets.get_or_create(from, block_time);
                    let outgoing = tx
                        .amount
                        .checked_add(tx.fee)
                        .map_err(|_| WalletError::Overflow)?;
                    self.wallets.debit(&from, outgoing)?;
                    self.wallets.credit(to, tx.amount, block_time)?;
                    self.wallets.advance_nonce(&from, tx.nonce)?;
                }
                TxType::ContractCreate => {
                    // The escrow (the tx amount) leaves the creator's balance
                    // and lives inside the contract until a terminal state.
                    let from = tx.sender();
                    self.capture_prior(priors, &from);
                    self.wallets.get_or_create(from, block_time);
                    let outgoing = tx
                        .amount
                        .checked_add(tx.fee)
                        .map_err(|_| WalletError::Overflow)?;
                    self.wallets.debit(&from, outgoing)?;
                    self.wallets.advance_nonce(&from, tx.nonce)?;
                }
                TxType::ContractAccept
                | TxType::ContractCheckpoint
                | TxType::ContractFinalize
                | TxType::ContractDispute => {
                    let from = tx.sender();
                    self.capture_prior(priors, &from);
                    self.wallets.get_or_create(from, block_time);
                    self.wallets.debit(&from, tx.fee)?;
                    self.wallets.advance_nonce(&from, tx.nonce)?;
                }
            }
        }

        // Expiry refunds and driver reputation penalties.
        for change in &effects.changes {
            if change.to != ContractState::Expired {
                continue;
            }
            let Some(prior) = &change.prior else { continue };
            self.capture_prior(priors, &prior.creator);
            self.wallets
                .credit(prior.creator, prior.escrow, block_time)?;
            if let Some(driver) = prior.driver {
                self.capture_prior(priors, &driver);
                self.wallets.record_delivery_failure(&driver, block_time);
            }
        }

        // Delivery payouts.
        for plan in &effects.payouts {
            self.capture_prior(priors, &plan.driver);
            self.wallets
                .credit(plan.driver, plan.driver_amount, block_time)?;
            self.wallets
                .record_delivery_success(&plan.driver, plan.driver_amount, block_time);

            // Validator pool: equal shares to the attesting validators, the
            // division remainder (and the whole pool when nobody attested)
            // to the reserve.
            let attestors = block.attestations.len() as i128;
            let mut to_reserve = plan.reserve;
            if attestors > 0 {
                let share = Amount::from_atoms(plan.validator_pool.atoms() / attestors);
                for attestation in &block.attestations {
                    self.capture_prior(priors, &attestation.validator);
                    self.wallets
                        .credit(attestation.validator, share, block_time)?;
                }
                let distributed = Amount::from_atoms(share.atoms() * attestors);
                to_reserve = to_reserve.saturating_add(
                    plan.validator_pool
                        .checked_sub(distributed)
                        .unwrap_or(Amount::ZERO),
                );
            } else {
                to_reserve = to_reserve.saturating_add(plan.validator_pool);
            }
            self.capture_prior(priors, &RESERVE_ADDRESS);
            self.wallets.credit(RESERVE_ADDRESS, to_reserve, block_time)?;

            // The minted portion of the payout is the scheduled base reward;
            // the escrow merely moved out of the contract.
            self.issued = self
                .issued
                .saturating_add(block_reward(height, &self.config));
        }
        Ok(())
    }

    fn capture_prior(&self, priors: &mut HashMap<Address, Option<Account>>, address: &Address) {
        priors
            .entry(*address)
            .or_insert_with(|| self.wallets.get(address).cloned());
    }

    fn restore_accounts(&mut self, priors: &HashMap<Address, Option<Account>>) {
        for (address, prior) in priors {
            self.wallets.restore(*address, prior.clone());
        }
    }

    fn undo_contract_changes(&mut self, changes: &[StateChange]) {
        // Newest-first so the earliest prior wins per contract.
        for change in changes.iter().rev() {
            self.contracts
                .restore(change.contract_id, change.prior.clone());
        }
    }

    // -------------------------------------------------------------------------
    // FORKS & REORG
    // -------------------------------------------------------------------------

    fn consider_fork(&mut self, mut block: Block, now: f64) -> Result<Applied, ChainError> {
        let parent_hash = block.header.parent_hash;
        let Some((parent_header, parent_work)) = self.headers.get(&parent_hash).cloned() else {
            return Err(ChainError::ParentUnknown { parent_hash });
        };
        if block.header.height == 0 {
            block.header.height = parent_header.height + 1;
        }

        let hash = block_hash(&block.header);
        let work = parent_work + work_for_bits(block.header.difficulty);
        let candidate_height = block.header.height;
        self.headers.insert(hash, (block.header.clone(), work));
        self.side_blocks.insert(hash, block);

        // Locate the fork point on the canonical chain.
        let fork_height = self.fork_point_height(parent_hash)?;
        let depth = self.tip.height.saturating_sub(fork_height);

        if check_reorg_depth(self.tip.height, fork_height, self.config.reorg_window).is_err() {
            // Refused, recorded, surfaced. Never applied automatically.
            warn!(depth, "fork beyond the reorg window refused");
            return Ok(Applied {
                events: vec![ChainEvent::SuspiciousFork {
                    tip_hash: hash,
                    fork_height,
                    depth,
                }],
                included: Vec::new(),
                extended_chain: false,
            });
        }

        let candidate = TipInfo {
            hash,
            height: candidate_height,
            cumulative_work: work,
            finalized_height: self.tip.finalized_height.min(fork_height),
        };
        if better_tip(&candidate, &self.tip) != Ordering::Greater {
            // Parked until its branch accumulates more work.
            return Ok(Applied::default());
        }

        self.reorg_to(hash, fork_height, now)
    }

    /// Height of the highest canonical ancestor of `cursor`.
    fn fork_point_height(&self, mut cursor: Hash) -> Result<u64, ChainError> {
        loop {
            let Some((header, _)) = self.headers.get(&cursor) else {
                return Err(ChainError::ParentUnknown {
                    parent_hash: cursor,
                });
            };
            if self.store.hash_at_height(header.height)? == Some(cursor) {
                return Ok(header.height);
            }
            cursor = header.parent_hash;
        }
    }

    fn reorg_to(
        &mut self,
        new_tip: Hash,
        fork_height: u64,
        now: f64,
    ) -> Result<Applied, ChainError> {
        info!(
            from = self.tip.height,
            fork = fork_height,
            "reorg to heavier branch"
        );

        // Snapshot everything; a failed step restores it wholesale.
        let saved_wallets = self.wallets.clone();
        let saved_contracts = self.contracts.clone();
        let saved_validators = self.validators.clone();
        let saved_issued = self.issued;
        let saved_tip = self.tip;

        match self.try_reorg(new_tip, fork_height, now) {
            Ok(applied) => {
                metrics::REORGS.inc();
                Ok(applied)
            }
            Err(err) => {
                warn!(error = %err, "reorg failed, restoring snapshot");
                self.wallets = saved_wallets;
                self.contracts = saved_contracts;
                self.validators = saved_validators;
                self.issued = saved_issued;
                self.tip = saved_tip;
                Err(err)
            }
        }
    }

    fn try_reorg(
        &mut self,
        new_tip: Hash,
        fork_height: u64,
        now: f64,
    ) -> Result<Applied, ChainError> {
        // Collect the new branch top-down, then apply oldest-first.
        let mut branch = Vec::new();
        let mut cursor = new_tip;
        while self.headers[&cursor].0.height > fork_height {
            let block = self
                .side_blocks
                .get(&cursor)
                .cloned()
                .ok_or(ChainError::ParentUnknown {
                    parent_hash: cursor,
                })?;
            cursor = block.header.parent_hash;
            branch.push(block);
        }
        branch.reverse();

        // Undo the canonical suffix, newest-first.
        let fork_hash = self
            .store
            .hash_at_height(fork_height)?
            .ok_or(StorageError::HeightNotFound {
                height: fork_height,
            })?;
        let fork_work = self
            .headers
            .get(&fork_hash)
            .map(|(_, work)| *work)
            .ok_or_else(|| {
                ChainError::Inconsistency("fork point header not tracked".into())
            })?;
        let old_tip = self.tip;
        let undone = self.store.rollback_to(
            fork_height,
            StoredTip {
                hash: fork_hash,
                height: fork_height,
                work_be: work_to_be(fork_work),
            },
            self.config.reorg_window,
        )?;

        let mut account_rows = Vec::new();
        let mut contract_rows = Vec::new();
        for record in &undone {
            for (address, prior) in &record.accounts {
                self.wallets.restore(*address, prior.clone());
                account_rows.push((*address, prior.clone()));
            }
            for (id, prior) in &record.contracts {
                self.contracts.restore(*id, prior.clone());
                contract_rows.push((*id, prior.clone()));
            }
            self.issued = record.issued_before;
        }
        self.store
            .persist_state_rows(&account_rows, &contract_rows, self.issued)?;

        self.tip = TipInfo {
            hash: fork_hash,
            height: fork_height,
            cumulative_work: fork_work,
            finalized_height: old_tip.finalized_height.min(fork_height),
        };

        // Apply the new branch under full validation.
        let mut applied = Applied {
            events: Vec::new(),
            included: Vec::new(),
            extended_chain: true,
        };
        for block in branch {
            let result = self.apply_to_tip(block, now)?;
            applied.events.extend(result.events);
            applied.included.extend(result.included);
        }

        applied.events.insert(
            0,
            ChainEvent::Reorg {
                common_ancestor: fork_hash,
                old_tip: old_tip.hash,
                new_tip: self.tip.hash,
                depth: old_tip.height - fork_height,
            },
        );
        Ok(applied)
    }
}

fn contract_priors(changes: &[StateChange]) -> Vec<(Hash, Option<Contract>)> {
    let mut seen = HashMap::new();
    for change in changes {
        seen.entry(change.contract_id)
            .or_insert_with(|| change.prior.clone());
    }
    seen.into_iter().collect()
}

fn delivery_duration(contract: &Contract) -> f64 {
    match (contract.checkpoints.first(), contract.checkpoints.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).max(0.0),
        _ => 0.0,
    }
}

fn work_to_be(work: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    work.to_big_endian(&mut out);
    out
}

fn map_grid<T>(result: Result<T, GridError>) -> Result<T, ChainError> {
    result.map_err(|err| match err {
        GridError::CoordinateSaturated { lat, lng, .. } => {
            ChainError::CoordinateSaturated { lat, lng }
        }
        GridError::InvalidCoordinate => {
            ChainError::Inconsistency("coordinates out of range survived validation".into())
        }
    })
}
