//! # Clip Market Runtime
//!
//! Entry point for the escrow ledger service.
//!
//! ## Startup Sequence
//!
//! 1. Initialise telemetry (logs, metrics registry)
//! 2. Load configuration from `MKT_*` variables and validate it
//! 3. Open the ledger store (replaying the journal when durable)
//! 4. Resume consumer cursors, start consumers, then the outbox relay
//! 5. Run until Ctrl+C, then shut down: relay first, then the consumers

use anyhow::{Context, Result};
use market_runtime::{load_config, MarketRuntime, Sinks};
use market_telemetry::{gather_metrics, init_telemetry, TelemetryConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_telemetry(&TelemetryConfig::from_env()).context("Failed to initialise telemetry")?;

    let config = load_config();
    config.validate().context("Invalid configuration")?;

    info!("===========================================");
    info!("  Clip Market Escrow Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!(
        durable = config.storage.durable,
        data_dir = %config.storage.data_dir.display(),
        max_conflict_retries = config.ledger.max_conflict_retries,
        "Configuration loaded"
    );

    let runtime = MarketRuntime::new(config).context("Failed to open the ledger")?;
    runtime
        .start(Sinks::default())
        .context("Failed to register consumers")?;

    info!("Runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;

    match gather_metrics() {
        Ok(text) => debug!(metrics = %text, "Final metrics"),
        Err(e) => debug!(error = %e, "Metrics unavailable"),
    }
    Ok(())
}
