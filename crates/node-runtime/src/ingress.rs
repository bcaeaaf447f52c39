//! Ingress operations.
//!
//! The interface the out-of-scope HTTP/REST layer calls into:
//! `submit_transaction`, `submit_block`, the three queries and the event
//! stream. Errors surface as the core error union with a short message and
//! structured context, never a stack trace.

use crate::actors::{ActorError, ChainHandle};
use crate::chain::ChainError;
use lc_consensus::ConsensusError;
use lc_mempool::{MempoolError, SharedMempool};
use parking_lot::Mutex;
use shared_bus::{EventFilter, EventStream, InMemoryEventBus};
use shared_crypto::{derive_address, signatures, tx_hash};
use shared_types::codec::{decode_block, decode_transaction, transaction_size, tx_signing_bytes};
use shared_types::{Address, ChainConfig, ContractState, CoreError, Hash};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Horizon of the per-sender submission window, in seconds.
const SUBMISSION_WINDOW_S: f64 = 60.0;

/// Full nonce runs a sender may submit per window. Anything past the
/// mempool's nonce-gap tolerance cannot become block-eligible anyway, so
/// sustained submission beyond a few runs per minute is flooding.
const RUNS_PER_WINDOW: usize = 4;

/// Per-sender submission gate at the ingress boundary.
///
/// Each sender gets a rolling one-minute window of submission timestamps,
/// capped at a multiple of the nonce-gap tolerance from the chain
/// configuration. Windows run on chain time, like the coordinate grid's
/// cells, and senders whose window has fully aged out are dropped.
struct SenderGate {
    windows: Mutex<HashMap<Address, VecDeque<f64>>>,
    max_per_window: usize,
}

impl SenderGate {
    fn new(config: &ChainConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_per_window: RUNS_PER_WINDOW * (config.mempool_nonce_gap as usize + 1),
        }
    }

    fn admit(&self, sender: Address, now: f64) -> Result<(), CoreError> {
        let mut windows = self.windows.lock();
        windows.retain(|_, window| {
            window
                .back()
                .map_or(false, |last| now - last <= SUBMISSION_WINDOW_S)
        });

        let window = windows.entry(sender).or_default();
        while window
            .front()
            .map_or(false, |oldest| now - oldest > SUBMISSION_WINDOW_S)
        {
            window.pop_front();
        }
        if window.len() >= self.max_per_window {
            return Err(CoreError::RateLimited);
        }
        window.push_back(now);
        Ok(())
    }
}

/// Submission receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub accepted: bool,
    pub hash: Hash,
}

/// `query_account` response.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountInfo {
    pub balance: String,
    pub nonce: u64,
    pub reputation: f64,
}

/// `query_contract` response.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractInfo {
    pub state: ContractState,
    pub checkpoint_count: usize,
    pub creator: Address,
    pub driver: Option<Address>,
}

/// `query_tip` response.
#[derive(Clone, Debug, PartialEq)]
pub struct TipSummary {
    pub height: u64,
    pub hash: Hash,
    pub cumulative_work: String,
}

/// The core's front door.
pub struct CoreHandle {
    config: ChainConfig,
    chain: ChainHandle,
    mempool: Arc<SharedMempool>,
    bus: Arc<InMemoryEventBus>,
    sender_gate: SenderGate,
}

impl CoreHandle {
    pub fn new(
        config: ChainConfig,
        chain: ChainHandle,
        mempool: Arc<SharedMempool>,
        bus: Arc<InMemoryEventBus>,
    ) -> Self {
        Self {
            sender_gate: SenderGate::new(&config),
            config,
            chain,
            mempool,
            bus,
        }
    }

    /// Submit a signed transaction from the wire.
    pub async fn submit_transaction(
        &self,
        tx_bytes: &[u8],
        now: f64,
    ) -> Result<SubmitReceipt, CoreError> {
        let tx = decode_transaction(tx_bytes).map_err(|e| CoreError::InvalidBlockStructure {
            reason: e.to_string(),
        })?;
        if tx.is_reward() {
            return Err(CoreError::InvalidBlockStructure {
                reason: "reward rows are miner-internal".into(),
            });
        }
        let hash = tx_hash(&tx);
        let sender = tx.sender();

        // Per-sender submission window.
        self.sender_gate.admit(sender, now)?;

        // Signature check under the verification budget; an over-budget
        // verification drops the transaction.
        let started = Instant::now();
        if derive_address(&tx.sender_pubkey) != sender {
            return Err(CoreError::InvalidSignature);
        }
        signatures::verify(&tx.sender_pubkey, &tx_signing_bytes(&tx), &tx.signature)
            .map_err(|_| CoreError::InvalidSignature)?;
        if started.elapsed().as_millis() as u64 > self.config.signature_verify_timeout_ms {
            return Err(CoreError::Timeout {
                operation: "signature verification".into(),
            });
        }

        // Replay and duplicate guards.
        if self.mempool.contains(&hash) {
            return Err(CoreError::DuplicateTransaction { tx_hash: hash });
        }
        if self
            .chain
            .tx_committed(hash)
            .await
            .map_err(actor_error)?
        {
            return Err(CoreError::ReplayDetected { tx_hash: hash });
        }

        let snapshot = self.chain.snapshot().await.map_err(actor_error)?;
        let size = transaction_size(&tx);
        self.mempool
            .submit(tx, hash, size, now, &snapshot)
            .map_err(|e| mempool_error(e, hash))?;

        debug!(hash = ?&hash[..4], "transaction admitted to mempool");
        Ok(SubmitReceipt {
            accepted: true,
            hash,
        })
    }

    /// Submit a block from the wire.
    pub async fn submit_block(
        &self,
        block_bytes: &[u8],
        now: f64,
    ) -> Result<SubmitReceipt, CoreError> {
        let block = decode_block(block_bytes).map_err(|e| CoreError::InvalidBlockStructure {
            reason: e.to_string(),
        })?;
        let hash = shared_crypto::block_hash(&block.header);

        let applied = self
            .chain
            .apply_block(block, now)
            .await
            .map_err(actor_error)?;

        Ok(SubmitReceipt {
            accepted: applied.extended_chain,
            hash,
        })
    }

    pub async fn query_account(&self, address: Address) -> Result<AccountInfo, CoreError> {
        let account = self.chain.account(address).await.map_err(actor_error)?;
        let account = account.unwrap_or_else(|| shared_types::Account::new(0.0));
        Ok(AccountInfo {
            balance: account.balance.to_string(),
            nonce: account.nonce,
            reputation: account.reputation,
        })
    }

    pub async fn query_contract(&self, id: Hash) -> Result<Option<ContractInfo>, CoreError> {
        let contract = self.chain.contract(id).await.map_err(actor_error)?;
        Ok(contract.map(|c| ContractInfo {
            state: c.state,
            checkpoint_count: c.checkpoints.len(),
            creator: c.creator,
            driver: c.driver,
        }))
    }

    pub async fn query_tip(&self) -> Result<TipSummary, CoreError> {
        let tip = self.chain.tip().await.map_err(actor_error)?;
        Ok(TipSummary {
            height: tip.height,
            hash: tip.hash,
            cumulative_work: tip.cumulative_work.to_string(),
        })
    }

    /// Stream of appended blocks, reorgs and contract transitions.
    pub fn subscribe_events(&self, filter: EventFilter) -> EventStream {
        self.bus.event_stream(filter)
    }
}

fn actor_error(err: ActorError) -> CoreError {
    match err {
        ActorError::ActorGone => CoreError::Cancelled,
        ActorError::Chain(chain) => chain_error(chain),
    }
}

fn chain_error(err: ChainError) -> CoreError {
    match err {
        ChainError::Halted => CoreError::PersistenceIoError {
            detail: "block application halted".into(),
        },
        ChainError::IncompatibleGenesis => CoreError::InvalidBlockStructure {
            reason: "incompatible genesis".into(),
        },
        ChainError::ParentUnknown { parent_hash } => CoreError::ParentUnknown { parent_hash },
        ChainError::ReplayDetected { tx_hash } => CoreError::ReplayDetected { tx_hash },
        ChainError::CoordinateSaturated { lat, lng } => CoreError::CoordinateSaturated { lat, lng },
        ChainError::Consensus(consensus) => consensus_error(consensus),
        ChainError::Wallet(wallet) => CoreError::InsufficientBalance {
            required: wallet.to_string(),
            available: String::new(),
        },
        ChainError::Storage(storage) => CoreError::PersistenceIoError {
            detail: storage.to_string(),
        },
        ChainError::Inconsistency(detail) => CoreError::IndexCorruption { detail },
    }
}

fn consensus_error(err: ConsensusError) -> CoreError {
    match err {
        ConsensusError::QuorumInsufficient { got, need } => {
            CoreError::QuorumInsufficient { got, need }
        }
        ConsensusError::ViewChangeTimeout { view } => CoreError::ViewChangeTimeout { view },
        ConsensusError::ProposerMisbehavior { validator } => {
            CoreError::ProposerMisbehavior { validator }
        }
        ConsensusError::ReorgBeyondWindow { depth, window } => {
            CoreError::ReorgBeyondWindow { depth, window }
        }
        ConsensusError::ParentUnknown { parent_hash } => CoreError::ParentUnknown { parent_hash },
        ConsensusError::BlockInvalid(block) => CoreError::InvalidBlockStructure {
            reason: block.to_string(),
        },
        ConsensusError::PodRejected(contract) => CoreError::ContractStateIllegalTransition {
            from: contract.to_string(),
            to: String::new(),
        },
        other => CoreError::InvalidBlockStructure {
            reason: other.to_string(),
        },
    }
}

fn mempool_error(err: MempoolError, submitted: Hash) -> CoreError {
    match err {
        MempoolError::DuplicateTransaction { tx_hash } => {
            CoreError::DuplicateTransaction { tx_hash }
        }
        // A competing transaction on the same (sender, nonce) without a
        // sufficient fee bump is a double-spend attempt from the submitter's
        // point of view.
        MempoolError::InsufficientFeeBump { .. } => CoreError::DuplicateTransaction {
            tx_hash: submitted,
        },
        MempoolError::StaleNonce {
            account_nonce,
            tx_nonce,
        } => CoreError::InvalidNonce {
            expected: account_nonce + 1,
            actual: tx_nonce,
        },
        MempoolError::NonceGapTooLarge {
            account_nonce,
            tx_nonce,
            ..
        } => CoreError::InvalidNonce {
            expected: account_nonce + 1,
            actual: tx_nonce,
        },
        MempoolError::PoolFull { capacity, .. } => CoreError::ResourceExhausted {
            resource: format!("mempool at {capacity} bytes"),
        },
        other => CoreError::InvalidBlockStructure {
            reason: other.to_string(),
        },
    }
}
