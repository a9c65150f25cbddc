//! Audit log consumer.

use super::{count, ConsumerFeed, Outcome, SinkError};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{AuditRecord, MarketEvent};
use std::sync::Arc;
use tracing::{info, warn};

pub const CONSUMER: &str = "audit";

/// Durable audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), SinkError>;
}

/// Writes audit records to the `audit` tracing target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, r: &AuditRecord) -> Result<(), SinkError> {
        info!(
            target: "audit",
            actor = ?r.actor,
            action = ?r.action,
            target_record = %r.target,
            before = %r.before,
            after = %r.after,
            at = %r.at,
            "Audit"
        );
        Ok(())
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), SinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Forwards `AuditRecorded` events to an [`AuditSink`].
pub struct AuditHandler {
    feed: ConsumerFeed,
    sink: Arc<dyn AuditSink>,
}

impl AuditHandler {
    #[must_use]
    pub fn new(feed: ConsumerFeed, sink: Arc<dyn AuditSink>) -> Self {
        Self { feed, sink }
    }

    /// Run the handler loop.
    pub async fn run(mut self) {
        info!("Audit handler started");

        while let Some(envelope) = self.feed.next().await {
            let MarketEvent::AuditRecorded(record) = &envelope.event else {
                continue;
            };

            match self.sink.record(record).await {
                Ok(()) => count(CONSUMER, Outcome::Ok),
                Err(e) => {
                    warn!(
                        sequence = envelope.sequence,
                        target_record = %record.target,
                        error = %e,
                        "Audit write failed"
                    );
                    count(CONSUMER, Outcome::Failed);
                }
            }
            self.feed.commit().await;
        }

        self.feed.commit().await;
        info!("Audit handler stopped, bus closed");
    }
}
