//! # LogiChain Node Daemon
//!
//! Boots the core: configuration, telemetry, persistence, the chain actor
//! and the consensus actor, then waits for shutdown.
//!
//! Exit codes: 0 normal, 1 configuration error, 2 unrecoverable
//! persistence corruption, 3 incompatible genesis.

use node_runtime::actors::{spawn_chain_actor, spawn_consensus_actor};
use node_runtime::adapters::RocksKv;
use node_runtime::chain::{Chain, ChainError};
use node_runtime::config::NodeConfig;
use node_runtime::exit_codes;
use node_runtime::gossip::GossipOutbox;
use node_runtime::ingress::CoreHandle;
use node_runtime::miner::spawn_miner;
use shared_crypto::signatures::Ed25519Keypair;
use lc_mempool::{MempoolConfig, SharedMempool};
use lc_storage::ChainStore;
use shared_bus::InMemoryEventBus;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

fn parse_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match parse_args() {
        Some(path) => match NodeConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("configuration error: {err}");
                return ExitCode::from(exit_codes::CONFIG_ERROR as u8);
            }
        },
        None => NodeConfig::default(),
    };

    if let Err(err) = lc_telemetry::init_logging(&config.log_level) {
        eprintln!("configuration error: {err}");
        return ExitCode::from(exit_codes::CONFIG_ERROR as u8);
    }
    let _ = lc_telemetry::metrics::register_all();

    info!("===========================================");
    info!("  LogiChain Core Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(mode = ?config.chain.mode, data_dir = %config.data_dir.display(), "starting");

    match run(config).await {
        Ok(()) => ExitCode::from(exit_codes::OK as u8),
        Err(RunError::Persistence(detail)) => {
            error!(%detail, "unrecoverable persistence corruption");
            ExitCode::from(exit_codes::PERSISTENCE_CORRUPT as u8)
        }
        Err(RunError::Genesis) => {
            error!("stored chain uses an incompatible genesis");
            ExitCode::from(exit_codes::INCOMPATIBLE_GENESIS as u8)
        }
        Err(RunError::Other(err)) => {
            error!(error = %err, "daemon failed");
            ExitCode::from(exit_codes::PERSISTENCE_CORRUPT as u8)
        }
    }
}

enum RunError {
    Persistence(String),
    Genesis,
    Other(anyhow::Error),
}

async fn run(config: NodeConfig) -> Result<(), RunError> {
    let kv = RocksKv::open(&config.data_dir.join("chainstate/index"))
        .map_err(|e| RunError::Persistence(e.to_string()))?;
    let store = ChainStore::open(&config.data_dir, kv, config.chain.segment_max_bytes)
        .map_err(|e| RunError::Persistence(e.to_string()))?;

    let chain = match Chain::bootstrap(config.chain.clone(), store) {
        Ok(chain) => chain,
        Err(ChainError::IncompatibleGenesis) => return Err(RunError::Genesis),
        Err(ChainError::Storage(e)) => return Err(RunError::Persistence(e.to_string())),
        Err(e) => return Err(RunError::Other(e.into())),
    };
    info!(height = chain.tip().height, "chain ready");

    let bus = Arc::new(InMemoryEventBus::new());
    let mempool = Arc::new(SharedMempool::new(MempoolConfig {
        max_bytes: config.chain.mempool_max_bytes,
        max_nonce_gap: config.chain.mempool_nonce_gap,
        rbf_min_bump_ppm: config.chain.rbf_min_bump_ppm,
        ..MempoolConfig::default()
    }));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let chain_handle = spawn_chain_actor(
        chain,
        Arc::clone(&bus),
        Arc::clone(&mempool),
        shutdown_rx.clone(),
    );
    let (_consensus_tx, _consensus_events) = spawn_consensus_actor(
        chain_handle.clone(),
        config.chain.proposal_timeout_seconds as f64,
        config.chain.view_timeout_cap_factor,
        shutdown_rx.clone(),
    );

    if let Some(address_text) = &config.miner_address {
        let miner_address = shared_crypto::parse_address(address_text)
            .expect("validated at configuration load");
        let outbox = Arc::new(GossipOutbox::new(Ed25519Keypair::generate()));
        spawn_miner(
            chain_handle.clone(),
            Arc::clone(&mempool),
            Arc::clone(&bus),
            outbox,
            config.chain.clone(),
            miner_address,
            shutdown_rx,
        );
        info!(miner = %address_text, "mining enabled");
    }

    let _core = CoreHandle::new(
        config.chain.clone(),
        chain_handle,
        Arc::clone(&mempool),
        Arc::clone(&bus),
    );

    info!("core running; the service layer attaches through CoreHandle");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| RunError::Other(e.into()))?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    // Actors unwind in reverse start order on the watch signal.
    tokio::task::yield_now().await;
    Ok(())
}
