//! # LC Telemetry
//!
//! Logging initialization and the Prometheus metric registry shared by the
//! core subsystems. Metric names follow `lc_<subsystem>_<metric>_<unit>`.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

use thiserror::Error;

/// Telemetry setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("logging init failed: {0}")]
    LoggingInit(String),

    #[error("metrics registration failed: {0}")]
    MetricsInit(String),
}
