//! Tracing subscriber setup for the daemon.

use crate::TelemetryError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber.
///
/// `RUST_LOG` wins when set; `default_level` (e.g. `"info"`) applies
/// otherwise. Safe to call once per process.
pub fn init_logging(default_level: &str) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
