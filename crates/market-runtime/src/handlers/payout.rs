//! Payout consumer.
//!
//! Credits the clipper for each settled submission. Settlements stay in the
//! outbox until this consumer's cursor passes them, so a crash between
//! settle and credit is picked up on the next start. The ledger call is
//! idempotent per submission, so redelivered settlements are harmless. A
//! failure that survives the engine's own retries is raised as a dead
//! letter for an operator; the settlement itself stays committed.

use super::{count, ConsumerFeed, Outcome};
use escrow_ledger::{EscrowApi, LedgerError, PayoutOutcome};
use shared_bus::{EventEnvelope, EventPublisher, MarketEvent};
use shared_types::SubmissionId;
use std::sync::Arc;
use tracing::{debug, error, info};

pub const CONSUMER: &str = "payout";

/// Runs `credit_clipper_payout` for every `SubmissionSettled` event.
pub struct PayoutHandler {
    feed: ConsumerFeed,
    api: Arc<dyn EscrowApi>,
    dead_letters: Arc<dyn EventPublisher>,
}

impl PayoutHandler {
    #[must_use]
    pub fn new(
        feed: ConsumerFeed,
        api: Arc<dyn EscrowApi>,
        dead_letters: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            feed,
            api,
            dead_letters,
        }
    }

    async fn credit(&self, submission_id: SubmissionId) -> Result<PayoutOutcome, LedgerError> {
        let api = Arc::clone(&self.api);
        tokio::task::spawn_blocking(move || api.credit_clipper_payout(submission_id))
            .await
            .map_err(|e| LedgerError::Storage(format!("payout task failed: {e}")))?
    }

    /// Run the handler loop.
    pub async fn run(mut self) {
        info!("Payout handler started");

        while let Some(envelope) = self.feed.next().await {
            let MarketEvent::SubmissionSettled { submission_id, .. } = envelope.event else {
                continue;
            };

            match self.credit(submission_id).await {
                Ok(PayoutOutcome::Credited { transaction }) => {
                    debug!(
                        submission = %submission_id,
                        transaction = %transaction.id,
                        "Settlement paid out"
                    );
                    count(CONSUMER, Outcome::Ok);
                }
                Ok(PayoutOutcome::AlreadyCredited { .. }) => count(CONSUMER, Outcome::Duplicate),
                Err(e) => {
                    error!(submission = %submission_id, error = %e, "Payout credit failed");
                    count(CONSUMER, Outcome::Failed);
                    let letter = EventEnvelope::dead_letter(
                        CONSUMER,
                        format!("submission {submission_id}: {e}"),
                        chrono::Utc::now(),
                    );
                    self.dead_letters.publish(letter).await;
                }
            }
            self.feed.commit().await;
        }

        self.feed.commit().await;
        info!("Payout handler stopped, bus closed");
    }
}
