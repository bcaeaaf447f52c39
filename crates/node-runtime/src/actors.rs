//! Actor wiring.
//!
//! The chain actor is the single writer: it owns [`Chain`] and applies
//! blocks serially from a bounded command queue. Readers go through the
//! same queue and receive cloned snapshots, so nothing ever observes a
//! half-applied block. The consensus actor drives the BFT round on a
//! monotonic clock and reports proposer faults back to the chain actor.
//!
//! Shutdown rides a watch channel; each actor drains, releases and exits.

use crate::chain::{Applied, Chain, ChainError, MiningParams};
use crate::snapshot::ChainSnapshot;
use lc_consensus::{BftEvent, BftRound, TipInfo};
use lc_mempool::SharedMempool;
use lc_storage::KeyValueStore;
use shared_bus::{ChainEvent, EventPublisher, InMemoryEventBus};
use shared_types::{Account, Address, Amount, Block, Contract, Hash, ValidatorId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

/// Bounded depth of the chain actor's command queue. Producers observe
/// backpressure through `send` awaiting a free slot.
pub const CHAIN_QUEUE_DEPTH: usize = 256;

/// Commands accepted by the chain actor.
pub enum ChainCommand {
    ApplyBlock {
        block: Block,
        now: f64,
        reply: oneshot::Sender<Result<Applied, ChainError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ChainSnapshot>,
    },
    QueryAccount {
        address: Address,
        reply: oneshot::Sender<Option<Account>>,
    },
    QueryContract {
        id: Hash,
        reply: oneshot::Sender<Option<Contract>>,
    },
    QueryTip {
        reply: oneshot::Sender<TipInfo>,
    },
    TxCommitted {
        hash: Hash,
        reply: oneshot::Sender<bool>,
    },
    RegisterValidator {
        address: Address,
        public_key: Vec<u8>,
        stake: Amount,
        reply: oneshot::Sender<Result<(), ChainError>>,
    },
    ValidatorFault {
        validator: ValidatorId,
        now: f64,
    },
    MiningParams {
        reply: oneshot::Sender<MiningParams>,
    },
}

/// Cloneable handle to the chain actor.
#[derive(Clone)]
pub struct ChainHandle {
    sender: mpsc::Sender<ChainCommand>,
}

#[derive(Debug, Error)]
pub enum ActorError {
    #[error("chain actor is gone")]
    ActorGone,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl ChainHandle {
    pub async fn apply_block(&self, block: Block, now: f64) -> Result<Applied, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::ApplyBlock { block, now, reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)?.map_err(Into::into)
    }

    pub async fn snapshot(&self) -> Result<ChainSnapshot, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::Snapshot { reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)
    }

    pub async fn account(&self, address: Address) -> Result<Option<Account>, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::QueryAccount { address, reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)
    }

    pub async fn contract(&self, id: Hash) -> Result<Option<Contract>, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::QueryContract { id, reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)
    }

    pub async fn tip(&self) -> Result<TipInfo, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::QueryTip { reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)
    }

    pub async fn tx_committed(&self, hash: Hash) -> Result<bool, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::TxCommitted { hash, reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)
    }

    pub async fn register_validator(
        &self,
        address: Address,
        public_key: Vec<u8>,
        stake: Amount,
    ) -> Result<(), ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::RegisterValidator {
                address,
                public_key,
                stake,
                reply,
            })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)?.map_err(Into::into)
    }

    pub async fn validator_fault(&self, validator: ValidatorId, now: f64) -> Result<(), ActorError> {
        self.sender
            .send(ChainCommand::ValidatorFault { validator, now })
            .await
            .map_err(|_| ActorError::ActorGone)
    }

    pub async fn mining_params(&self) -> Result<MiningParams, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(ChainCommand::MiningParams { reply })
            .await
            .map_err(|_| ActorError::ActorGone)?;
        rx.await.map_err(|_| ActorError::ActorGone)
    }
}

/// Spawn the chain actor. Applied-block events go to the bus; included
/// transactions are pruned from the mempool against the fresh snapshot.
pub fn spawn_chain_actor<KV: KeyValueStore + 'static>(
    mut chain: Chain<KV>,
    bus: Arc<InMemoryEventBus>,
    mempool: Arc<SharedMempool>,
    mut shutdown: watch::Receiver<bool>,
) -> ChainHandle {
    let (sender, mut receiver) = mpsc::channel(CHAIN_QUEUE_DEPTH);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = receiver.recv() => {
                    let Some(command) = command else { break };
                    handle_command(&mut chain, command, &bus, &mempool).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("chain actor stopped");
    });

    ChainHandle { sender }
}

async fn handle_command<KV: KeyValueStore>(
    chain: &mut Chain<KV>,
    command: ChainCommand,
    bus: &InMemoryEventBus,
    mempool: &SharedMempool,
) {
    match command {
        ChainCommand::ApplyBlock { block, now, reply } => {
            let result = chain.apply_block(block, now);
            if let Ok(applied) = &result {
                for event in applied.events.clone() {
                    bus.publish(event).await;
                }
                if applied.extended_chain {
                    let snapshot = chain.snapshot();
                    mempool.on_block_applied(&applied.included, &snapshot);
                }
            }
            let _ = reply.send(result);
        }
        ChainCommand::Snapshot { reply } => {
            let _ = reply.send(chain.snapshot());
        }
        ChainCommand::QueryAccount { address, reply } => {
            let _ = reply.send(chain.account(&address).cloned());
        }
        ChainCommand::QueryContract { id, reply } => {
            let _ = reply.send(chain.contract(&id).cloned());
        }
        ChainCommand::QueryTip { reply } => {
            let _ = reply.send(chain.tip());
        }
        ChainCommand::TxCommitted { hash, reply } => {
            let _ = reply.send(chain.tx_is_committed(&hash).unwrap_or(false));
        }
        ChainCommand::RegisterValidator {
            address,
            public_key,
            stake,
            reply,
        } => {
            let _ = reply.send(chain.register_validator(address, &public_key, stake));
        }
        ChainCommand::ValidatorFault { validator, now } => {
            chain.record_validator_fault(&validator, now);
        }
        ChainCommand::MiningParams { reply } => {
            let _ = reply.send(chain.mining_params());
        }
    }
}

// =============================================================================
// CONSENSUS ACTOR
// =============================================================================

/// Inbound traffic for the consensus actor.
pub enum ConsensusCommand {
    /// Start the round for the next height.
    StartRound {
        committee: Vec<ValidatorId>,
        quorum: usize,
        height: u64,
        last_committed: u64,
    },
    /// The current proposer's announcement.
    PrePrepare {
        view: u64,
        proposer: ValidatorId,
        block_hash: Hash,
    },
    Prepare {
        view: u64,
        validator: ValidatorId,
        block_hash: Hash,
    },
    Commit {
        view: u64,
        validator: ValidatorId,
        block_hash: Hash,
    },
    ViewChange {
        new_view: u64,
        validator: ValidatorId,
    },
}

/// Spawn the consensus actor: a single logical timeline over a monotonic
/// clock, never wall time. Emits round events to `events_out` and reports
/// silent proposers to the chain actor.
pub fn spawn_consensus_actor(
    chain: ChainHandle,
    proposal_timeout_s: f64,
    timeout_cap_factor: u32,
    mut shutdown: watch::Receiver<bool>,
) -> (mpsc::Sender<ConsensusCommand>, mpsc::Receiver<BftEvent>) {
    let (command_tx, mut command_rx) = mpsc::channel::<ConsensusCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<BftEvent>(256);

    tokio::spawn(async move {
        let epoch = Instant::now();
        let monotonic = move || epoch.elapsed().as_secs_f64();
        let mut round: Option<BftRound> = None;
        let mut ticker = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    let Some(command) = command else { break };
                    let event = match command {
                        ConsensusCommand::StartRound { committee, quorum, height, last_committed } => {
                            if committee.is_empty() {
                                warn!("cannot start a round without a committee");
                                continue;
                            }
                            round = Some(BftRound::new(
                                committee,
                                quorum,
                                height,
                                last_committed,
                                proposal_timeout_s,
                                timeout_cap_factor,
                                monotonic(),
                            ));
                            None
                        }
                        ConsensusCommand::PrePrepare { view, proposer, block_hash } => round
                            .as_mut()
                            .and_then(|r| r.on_pre_prepare(view, proposer, block_hash)),
                        ConsensusCommand::Prepare { view, validator, block_hash } => round
                            .as_mut()
                            .and_then(|r| r.on_prepare(view, validator, block_hash)),
                        ConsensusCommand::Commit { view, validator, block_hash } => round
                            .as_mut()
                            .and_then(|r| r.on_commit(view, validator, block_hash)),
                        ConsensusCommand::ViewChange { new_view, validator } => round
                            .as_mut()
                            .and_then(|r| r.on_view_change(new_view, validator, monotonic())),
                    };
                    if let Some(event) = event {
                        if let BftEvent::NewView { silent_proposer, .. } = &event {
                            let _ = chain.validator_fault(*silent_proposer, monotonic()).await;
                        }
                        let _ = event_tx.send(event).await;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(event) = round.as_mut().and_then(|r| r.on_tick(monotonic())) {
                        let _ = event_tx.send(event).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("consensus actor stopped");
    });

    (command_tx, event_rx)
}
