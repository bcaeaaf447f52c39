//! Prometheus counters and gauges for the core subsystems.

use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry.
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONSENSUS
    // =========================================================================

    /// Total BFT view changes.
    pub static ref VIEW_CHANGES: Counter = Counter::new(
        "lc_consensus_view_changes_total",
        "Total number of BFT view changes"
    ).expect("metric creation failed");

    /// Blocks accepted by the hybrid engine.
    pub static ref BLOCKS_APPENDED: Counter = Counter::new(
        "lc_chain_blocks_appended_total",
        "Total blocks appended to the best chain"
    ).expect("metric creation failed");

    /// Reorgs applied within the window.
    pub static ref REORGS: Counter = Counter::new(
        "lc_chain_reorgs_total",
        "Total chain reorganizations applied"
    ).expect("metric creation failed");

    /// Current best-chain height.
    pub static ref CHAIN_HEIGHT: Gauge = Gauge::new(
        "lc_chain_height",
        "Current best chain height"
    ).expect("metric creation failed");

    // =========================================================================
    // MEMPOOL
    // =========================================================================

    /// Bundles evicted under capacity pressure.
    pub static ref MEMPOOL_EVICTIONS: Counter = Counter::new(
        "lc_mempool_evictions_total",
        "Total mempool bundles evicted"
    ).expect("metric creation failed");

    // =========================================================================
    // PROOF OF DELIVERY
    // =========================================================================

    /// Checkpoints rejected during validation.
    pub static ref CHECKPOINTS_REJECTED: Counter = Counter::new(
        "lc_pod_checkpoints_rejected_total",
        "Total checkpoints rejected by proof-of-delivery validation"
    ).expect("metric creation failed");

    /// Contracts that reached VALIDATED.
    pub static ref CONTRACTS_VALIDATED: Counter = Counter::new(
        "lc_pod_contracts_validated_total",
        "Total contracts validated and paid out"
    ).expect("metric creation failed");
}

/// Register every metric with the global registry. Call once at startup.
pub fn register_all() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(VIEW_CHANGES.clone()),
        Box::new(BLOCKS_APPENDED.clone()),
        Box::new(REORGS.clone()),
        Box::new(CHAIN_HEIGHT.clone()),
        Box::new(MEMPOOL_EVICTIONS.clone()),
        Box::new(CHECKPOINTS_REJECTED.clone()),
        Box::new(CONTRACTS_VALIDATED.clone()),
    ];
    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Render the registry in Prometheus text exposition format.
pub fn gather() -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
