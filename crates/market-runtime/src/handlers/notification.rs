//! Notification consumer.

use super::{count, ConsumerFeed, Outcome, SinkError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared_bus::MarketEvent;
use shared_types::{AccountId, CampaignId, SubmissionId};
use std::sync::Arc;
use tracing::{info, warn};

pub const CONSUMER: &str = "notification";

/// What the notification transport receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event_type: &'static str,
    pub account_id: AccountId,
    pub campaign_id: Option<CampaignId>,
    pub submission_id: Option<SubmissionId>,
    pub amount: Option<Decimal>,
}

impl Notification {
    /// Build the notification for `event`. Events not addressed to an
    /// account produce none.
    #[must_use]
    pub fn from_event(event: &MarketEvent) -> Option<Self> {
        if matches!(
            event,
            MarketEvent::AuditRecorded(_) | MarketEvent::CriticalError { .. }
        ) {
            return None;
        }
        Some(Self {
            event_type: event.event_type(),
            account_id: event.account_id()?,
            campaign_id: event.campaign_id(),
            submission_id: event.submission_id(),
            amount: event.amount(),
        })
    }
}

/// Notification delivery transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), SinkError>;
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, n: &Notification) -> Result<(), SinkError> {
        info!(
            target: "notifications",
            event_type = n.event_type,
            account = %n.account_id,
            campaign = ?n.campaign_id,
            submission = ?n.submission_id,
            amount = ?n.amount,
            "Notification"
        );
        Ok(())
    }
}

/// Turns committed events into notifications.
pub struct NotificationHandler {
    feed: ConsumerFeed,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationHandler {
    #[must_use]
    pub fn new(feed: ConsumerFeed, sink: Arc<dyn NotificationSink>) -> Self {
        Self { feed, sink }
    }

    /// Run the handler loop.
    pub async fn run(mut self) {
        info!("Notification handler started");

        while let Some(envelope) = self.feed.next().await {
            let Some(notification) = Notification::from_event(&envelope.event) else {
                continue;
            };

            match self.sink.notify(&notification).await {
                Ok(()) => count(CONSUMER, Outcome::Ok),
                Err(e) => {
                    warn!(
                        event_type = notification.event_type,
                        account = %notification.account_id,
                        error = %e,
                        "Notification delivery failed"
                    );
                    count(CONSUMER, Outcome::Failed);
                }
            }
            self.feed.commit().await;
        }

        self.feed.commit().await;
        info!("Notification handler stopped, bus closed");
    }
}
