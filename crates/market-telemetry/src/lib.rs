//! # Market Telemetry
//!
//! Logging and metrics for the escrow ledger and its runtime.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an env filter, human or JSON output
//! - **Metrics**: Prometheus counters and histograms in a private registry,
//!   rendered as text by [`gather_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // Ledger operations now log and count
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MKT_SERVICE_NAME` | `clip-market` | Service name in logs |
//! | `MKT_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directives |
//! | `MKT_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `MKT_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `MKT_ENVIRONMENT` | `dev` | Deployment environment label |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_metrics, register_metrics, OperationTimer, BUDGET_INCREASES, CONFLICT_RETRIES,
    ESCROWED_AMOUNT, EVENTS_HANDLED, LEDGER_ERRORS, OUTBOX_BACKLOG, OUTBOX_PUBLISHED,
    PAYOUTS_CREDITED, REJECTIONS, SETTLEMENTS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the global tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
