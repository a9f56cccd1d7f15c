//! # Node Telemetry
//!
//! Observability for the range-stores node.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry with an `EnvFilter` and a
//!   pretty or JSON `fmt` layer.
//! - **Metrics**: Prometheus counters and gauges for the store protocols
//!   (reservations, consistency checks, dispatch, freeze).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use node_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NODE_SERVICE_NAME` | `range-stores` | Service name attached to logs |
//! | `NODE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `NODE_JSON_LOGS` | `false` | Emit JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_metrics, register_metrics, CHECKSUM_MISMATCHES, FROZEN_REPLICAS, MISROUTED_REQUESTS,
    RESERVATIONS, RESERVATIONS_EXPIRED, RESERVED_BYTES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialise logging and register the node's metrics.
///
/// Logging can only be installed once per process; a second call fails
/// with [`TelemetryError::LoggingInit`].
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)?;
    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "[telemetry] initialised"
    );
    Ok(())
}
