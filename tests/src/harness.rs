//! Chain fixtures shared by the scenario and property tests.

use lc_block::assembler::build_candidate;
use lc_block::mine;
use lc_contracts::{AcceptPayload, CheckpointPayload, ContractCreatePayload, FinalizePayload};
use lc_storage::{ChainStore, MemoryKv};
use node_runtime::chain::{Applied, Chain, ChainError};
use node_runtime::genesis::genesis_wallet_keypair;
use shared_crypto::signatures::{Ed25519Keypair, Keypair};
use shared_crypto::{checkpoint_signing_bytes, tx_hash};
use shared_types::codec::tx_signing_bytes;
use shared_types::{
    Address, Amount, Attestation, Block, CargoManifest, ChainConfig, Checkpoint, GeoPoint, Hash,
    Transaction, TxType, PROTOCOL_VERSION,
};
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

/// A chain over an in-memory index and a temp segment directory.
pub struct Harness {
    pub chain: Chain<MemoryKv>,
    pub config: ChainConfig,
    _dir: TempDir,
}

impl Harness {
    pub fn new(config: ChainConfig) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = ChainStore::open(dir.path(), MemoryKv::new(), config.segment_max_bytes)
            .expect("open store");
        let chain = Chain::bootstrap(config.clone(), store).expect("bootstrap");
        Self {
            chain,
            config,
            _dir: dir,
        }
    }

    /// Small test network: few wallets, trivial difficulty.
    pub fn test_config(genesis_wallets: u64) -> ChainConfig {
        ChainConfig {
            genesis_wallets,
            initial_difficulty_bits: 1,
            ..ChainConfig::on_grid()
        }
    }

    pub fn wallet(index: u64) -> Keypair {
        genesis_wallet_keypair(index)
    }

    pub fn wallet_address(index: u64) -> Address {
        Self::wallet(index).address()
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.chain
            .account(address)
            .map(|a| a.balance)
            .unwrap_or(Amount::ZERO)
    }

    pub fn next_timestamp(&self) -> f64 {
        self.chain.tip_header().timestamp + self.config.target_block_time_seconds as f64
    }

    /// Build, mine and apply a block of transactions on the current tip.
    pub fn mine_block(&mut self, txs: Vec<Transaction>, miner: Address) -> Result<Applied, ChainError> {
        let (block, _) = self.build_block(txs, miner, Vec::new());
        let now = block.header.timestamp;
        self.chain.apply_block(block, now)
    }

    /// Same, but with committee attestations over the mined hash.
    pub fn mine_block_attested(
        &mut self,
        txs: Vec<Transaction>,
        miner: Address,
        signers: &[(Address, Ed25519Keypair)],
    ) -> Result<Applied, ChainError> {
        let (mut block, hash) = self.build_block(txs, miner, Vec::new());
        block.attestations = signers
            .iter()
            .map(|(validator, keypair)| Attestation {
                validator: *validator,
                signature: keypair.sign(&hash),
            })
            .collect();
        let now = block.header.timestamp;
        self.chain.apply_block(block, now)
    }

    /// Build and mine a block without applying it.
    pub fn build_block(
        &self,
        txs: Vec<Transaction>,
        miner: Address,
        attestations: Vec<Attestation>,
    ) -> (Block, Hash) {
        self.build_block_on(
            self.chain.tip().hash,
            self.chain.tip().height,
            self.next_timestamp(),
            txs,
            miner,
            attestations,
        )
    }

    /// Build and mine a block on an arbitrary parent.
    pub fn build_block_on(
        &self,
        parent_hash: Hash,
        parent_height: u64,
        timestamp: f64,
        txs: Vec<Transaction>,
        miner: Address,
        attestations: Vec<Attestation>,
    ) -> (Block, Hash) {
        let mut block = build_candidate(
            parent_hash,
            parent_height,
            txs,
            miner,
            timestamp,
            self.config.initial_difficulty_bits,
            &self.config,
        )
        .expect("candidate");
        let hash = mine(&mut block, &AtomicBool::new(false)).expect("mine");
        block.attestations = attestations;
        (block, hash)
    }

    /// Register `n` validators with Ed25519 keys derived from fixed seeds
    /// and form the first committee.
    pub fn register_validators(&mut self, n: u8) -> Vec<(Address, Ed25519Keypair)> {
        let stake = self.config.validator_stake;
        (1..=n)
            .map(|i| {
                let keypair = Ed25519Keypair::from_seed([0x40 + i; 32]);
                let address = shared_crypto::derive_address(&keypair.public_key());
                self.chain
                    .register_validator(address, &keypair.public_key(), stake)
                    .expect("register validator");
                (address, keypair)
            })
            .collect()
    }
}

// =============================================================================
// TRANSACTION BUILDERS
// =============================================================================

pub fn signed_tx(
    keypair: &Keypair,
    tx_type: TxType,
    to: Option<Address>,
    amount: Amount,
    fee: Amount,
    nonce: u64,
    timestamp: f64,
    payload: Vec<u8>,
) -> Transaction {
    let mut tx = Transaction {
        version: PROTOCOL_VERSION,
        tx_type,
        from: Some(keypair.address()),
        to,
        amount,
        nonce,
        fee,
        timestamp,
        sender_pubkey: keypair.public_key(),
        payload,
        signature: [0u8; 64],
    };
    tx.signature = keypair.sign(&tx_signing_bytes(&tx));
    tx
}

pub fn transfer(
    keypair: &Keypair,
    to: Address,
    amount: Amount,
    fee: Amount,
    nonce: u64,
    timestamp: f64,
) -> Transaction {
    signed_tx(
        keypair,
        TxType::Transfer,
        Some(to),
        amount,
        fee,
        nonce,
        timestamp,
        Vec::new(),
    )
}

/// A São Paulo delivery: ~1.5 km route, 100 m tolerance.
pub fn sample_contract_terms(escrow: Amount, expires_at: f64) -> ContractCreatePayload {
    ContractCreatePayload {
        pickup: GeoPoint::new(-23.55, -46.63),
        delivery: GeoPoint::new(-23.56, -46.64),
        tolerance_radius_m: 100.0,
        max_error_m: 10.0,
        cargo: CargoManifest {
            cargo_type: "parcel".into(),
            weight_kg: 3.5,
            volume_m3: 0.05,
            priority: 10,
            estimated_value: Amount::units(40),
        },
        escrow,
        expires_at,
    }
}

pub fn create_contract_tx(
    creator: &Keypair,
    terms: &ContractCreatePayload,
    nonce: u64,
    timestamp: f64,
) -> (Transaction, Hash) {
    let tx = signed_tx(
        creator,
        TxType::ContractCreate,
        Some(creator.address()),
        terms.escrow,
        Amount::ZERO,
        nonce,
        timestamp,
        terms.to_bytes(),
    );
    let id = tx_hash(&tx);
    (tx, id)
}

pub fn accept_contract_tx(
    driver: &Keypair,
    checkpoint_key: &Ed25519Keypair,
    contract_id: Hash,
    nonce: u64,
    timestamp: f64,
) -> Transaction {
    signed_tx(
        driver,
        TxType::ContractAccept,
        None,
        Amount::ZERO,
        Amount::ZERO,
        nonce,
        timestamp,
        AcceptPayload {
            contract_id,
            checkpoint_key: checkpoint_key.public_key().to_vec(),
        }
        .to_bytes(),
    )
}

/// Build a signed checkpoint chained onto `prev`.
pub fn make_checkpoint(
    checkpoint_key: &Ed25519Keypair,
    contract_id: Hash,
    seq: u32,
    position: GeoPoint,
    timestamp: f64,
    accuracy_m: f64,
    prev: Option<&Checkpoint>,
) -> Checkpoint {
    let prev_hash = prev
        .map(|cp| shared_crypto::checkpoint_hash(&contract_id, cp))
        .unwrap_or([0u8; 32]);
    let mut cp = Checkpoint {
        seq,
        timestamp,
        position,
        accuracy_m,
        sensors: None,
        prev_hash,
        signature: [0u8; 64],
    };
    cp.signature = checkpoint_key.sign(&checkpoint_signing_bytes(&contract_id, &cp));
    cp
}

pub fn checkpoint_tx(
    driver: &Keypair,
    contract_id: Hash,
    checkpoint: Checkpoint,
    nonce: u64,
    timestamp: f64,
) -> Transaction {
    signed_tx(
        driver,
        TxType::ContractCheckpoint,
        None,
        Amount::ZERO,
        Amount::ZERO,
        nonce,
        timestamp,
        CheckpointPayload {
            contract_id,
            checkpoint,
        }
        .to_bytes(),
    )
}

pub fn finalize_tx(driver: &Keypair, contract_id: Hash, nonce: u64, timestamp: f64) -> Transaction {
    signed_tx(
        driver,
        TxType::ContractFinalize,
        None,
        Amount::ZERO,
        Amount::ZERO,
        nonce,
        timestamp,
        FinalizePayload { contract_id }.to_bytes(),
    )
}

