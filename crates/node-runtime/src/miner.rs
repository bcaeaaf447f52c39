//! The mining loop.
//!
//! Pulls the best bundles from the mempool, assembles a candidate on the
//! current tip, and searches the nonce space on a blocking worker. A block
//! landing on the chain (ours or a peer's) preempts the search through the
//! cancel flag and the loop restarts on the new parent.

use crate::actors::ChainHandle;
use crate::gossip::GossipOutbox;
use lc_block::assembler::build_candidate;
use lc_block::{mine, BlockError};
use lc_mempool::SharedMempool;
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus};
use shared_types::{Address, ChainConfig, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{info, warn};

fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Spawn the miner task.
pub fn spawn_miner(
    chain: ChainHandle,
    mempool: Arc<SharedMempool>,
    bus: Arc<InMemoryEventBus>,
    outbox: Arc<GossipOutbox>,
    config: ChainConfig,
    miner_address: Address,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut tip_events = bus.subscribe(EventFilter::for_topics(vec![
            EventTopic::Blocks,
            EventTopic::Reorgs,
        ]));

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Ok(params) = chain.mining_params().await else { break };
            let Ok(snapshot) = chain.snapshot().await else { break };

            let now = wall_clock();
            // Leave room for the reward row in both caps.
            let bundles = mempool.take_for_block(
                &snapshot,
                config.tx_count_cap.saturating_sub(1),
                config.block_size_cap_bytes / 2,
                now,
            );
            let selected: Vec<Transaction> = bundles
                .into_iter()
                .flat_map(|bundle| bundle.txs)
                .collect();

            let timestamp = now.max(params.parent_timestamp + 0.001);
            let mut candidate = match build_candidate(
                params.parent_hash,
                params.parent_height,
                selected,
                miner_address,
                timestamp,
                params.difficulty_bits,
                &config,
            ) {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!(error = %err, "candidate assembly failed");
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    continue;
                }
            };

            // Mine on a blocking worker; preempt when the tip moves.
            let cancel = Arc::new(AtomicBool::new(false));
            let worker_cancel = Arc::clone(&cancel);
            let mut worker = tokio::task::spawn_blocking(move || {
                let result = mine(&mut candidate, &worker_cancel);
                (candidate, result)
            });

            let outcome = loop {
                tokio::select! {
                    joined = &mut worker => break Some(joined),
                    event = tip_events.recv() => {
                        // New parent: stop wasting cycles on the stale one.
                        cancel.store(true, Ordering::Relaxed);
                        if event.is_none() {
                            // Bus gone; finish the round and bail out.
                            break Some((&mut worker).await);
                        }
                    }
                    _ = shutdown.changed() => {
                        cancel.store(true, Ordering::Relaxed);
                        if *shutdown.borrow() {
                            let _ = (&mut worker).await;
                            break None;
                        }
                    }
                }
            };
            let Some(joined) = outcome else { break };

            match joined {
                Ok((block, Ok(hash))) => {
                    let announced = block.clone();
                    match chain.apply_block(block, wall_clock()).await {
                        Ok(applied) if applied.extended_chain => {
                            info!(hash = ?&hash[..4], "mined block appended");
                            outbox.announce_block(&announced, wall_clock());
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "mined block no longer applies"),
                    }
                }
                Ok((_, Err(BlockError::MiningCancelled))) => {
                    // Restart on the new tip.
                }
                Ok((_, Err(err))) => {
                    warn!(error = %err, "nonce search failed");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "mining worker panicked");
                }
            }
        }
        info!("miner stopped");
    });
}
