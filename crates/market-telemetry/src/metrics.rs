//! Prometheus metrics for the escrow ledger.
//!
//! All metrics follow the naming convention: `mkt_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., settlements_total)
//! - **Gauge**: Value that can go up or down (e.g., outbox_backlog)
//! - **Histogram**: Distribution of values (e.g., operation_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // ESCROW ENGINE
    // =========================================================================

    /// Committed campaign budget increases
    pub static ref BUDGET_INCREASES: Counter = Counter::new(
        "mkt_escrow_budget_increases_total",
        "Total committed campaign budget increases"
    ).expect("metric creation failed");

    /// Committed submission settlements
    pub static ref SETTLEMENTS: Counter = Counter::new(
        "mkt_escrow_settlements_total",
        "Total approved submissions settled against a campaign pool"
    ).expect("metric creation failed");

    /// Committed submission rejections
    pub static ref REJECTIONS: Counter = Counter::new(
        "mkt_escrow_rejections_total",
        "Total submissions rejected"
    ).expect("metric creation failed");

    /// Clipper payout credits
    pub static ref PAYOUTS_CREDITED: Counter = Counter::new(
        "mkt_escrow_payouts_credited_total",
        "Total clipper payouts credited"
    ).expect("metric creation failed");

    /// Optimistic concurrency retries
    pub static ref CONFLICT_RETRIES: Counter = Counter::new(
        "mkt_escrow_conflict_retries_total",
        "Units of work retried after a version conflict"
    ).expect("metric creation failed");

    /// Funds moved into escrow, in major units
    pub static ref ESCROWED_AMOUNT: CounterVec = CounterVec::new(
        Opts::new("mkt_escrow_escrowed_amount", "Funds moved from available to pending"),
        &["currency"]
    ).expect("metric creation failed");

    /// Failed operations by error kind
    pub static ref LEDGER_ERRORS: CounterVec = CounterVec::new(
        Opts::new("mkt_escrow_errors_total", "Failed ledger operations by kind"),
        &["operation", "kind"]
    ).expect("metric creation failed");

    /// Operation latency, including retries
    pub static ref OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "mkt_escrow_operation_duration_seconds",
            "Time spent in escrow engine operations"
        ).buckets(exponential_buckets(0.0001, 2.0, 15).expect("valid buckets")),
        &["operation"]
    ).expect("metric creation failed");

    // =========================================================================
    // OUTBOX
    // =========================================================================

    /// Events published by the outbox relay
    pub static ref OUTBOX_PUBLISHED: Counter = Counter::new(
        "mkt_outbox_events_published_total",
        "Outbox entries published to the event bus"
    ).expect("metric creation failed");

    /// Entries some consumer has not handled yet
    pub static ref OUTBOX_BACKLOG: Gauge = Gauge::new(
        "mkt_outbox_backlog",
        "Outbox entries retained for at least one consumer"
    ).expect("metric creation failed");

    // =========================================================================
    // CONSUMERS
    // =========================================================================

    /// Events handled by downstream consumers
    pub static ref EVENTS_HANDLED: CounterVec = CounterVec::new(
        Opts::new("mkt_consumer_events_handled_total", "Events handled by consumers"),
        &["consumer", "outcome"]  // outcome: ok/duplicate/failed
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BUDGET_INCREASES.clone()),
        Box::new(SETTLEMENTS.clone()),
        Box::new(REJECTIONS.clone()),
        Box::new(PAYOUTS_CREDITED.clone()),
        Box::new(CONFLICT_RETRIES.clone()),
        Box::new(ESCROWED_AMOUNT.clone()),
        Box::new(LEDGER_ERRORS.clone()),
        Box::new(OPERATION_DURATION.clone()),
        Box::new(OUTBOX_PUBLISHED.clone()),
        Box::new(OUTBOX_BACKLOG.clone()),
        Box::new(EVENTS_HANDLED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(())
}

/// Encode all registered metrics in Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct OperationTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl OperationTimer {
    /// Start timing `operation`. The duration is observed on drop.
    pub fn start(operation: &str) -> Self {
        Self {
            histogram: OPERATION_DURATION.with_label_values(&[operation]),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
