//! # Market Events
//!
//! Defines all event types that flow through the shared bus. Every event is
//! produced by a committed ledger mutation and is published only after that
//! commit, wrapped in an `EventEnvelope` carrying its outbox sequence.

use serde::{Deserialize, Serialize};
use shared_types::{AccountId, Amount, CampaignId, Currency, SubmissionId, Timestamp, TransactionId};
use uuid::Uuid;

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    // =========================================================================
    // ESCROW
    // =========================================================================
    /// Advertiser funds were moved into escrow for a campaign budget increase.
    BudgetEscrowed {
        advertiser_id: AccountId,
        campaign_id: CampaignId,
        transaction_id: TransactionId,
        /// Amount moved from `available` to `pending`.
        delta: Amount,
        /// Campaign budget after the increase.
        new_budget: Amount,
        currency: Currency,
    },

    // =========================================================================
    // REVIEW
    // =========================================================================
    /// A submission was approved and settled against the campaign pool.
    SubmissionSettled {
        advertiser_id: AccountId,
        clipper_id: AccountId,
        campaign_id: CampaignId,
        submission_id: SubmissionId,
        transaction_id: TransactionId,
        amount_earned: Amount,
        currency: Currency,
    },

    /// A submission was rejected. No ledger mutation.
    SubmissionRejected {
        advertiser_id: AccountId,
        clipper_id: AccountId,
        campaign_id: CampaignId,
        submission_id: SubmissionId,
    },

    // =========================================================================
    // PAYOUT
    // =========================================================================
    /// An approved submission's earnings were credited to the clipper.
    PayoutCredited {
        clipper_id: AccountId,
        campaign_id: CampaignId,
        submission_id: SubmissionId,
        transaction_id: TransactionId,
        amount: Amount,
        currency: Currency,
    },

    // =========================================================================
    // AUDIT
    // =========================================================================
    /// Compliance record of a state-changing call.
    AuditRecorded(AuditRecord),

    // =========================================================================
    // CRITICAL EVENTS (DLQ)
    // =========================================================================
    /// A consumer failed to process an event and needs operator attention.
    CriticalError {
        /// Component that encountered the error.
        component: String,
        /// Error description.
        error: String,
    },
}

impl MarketEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BudgetEscrowed { .. } => EventTopic::Escrow,
            Self::SubmissionSettled { .. } | Self::SubmissionRejected { .. } => EventTopic::Review,
            Self::PayoutCredited { .. } => EventTopic::Payout,
            Self::AuditRecorded(_) => EventTopic::Audit,
            Self::CriticalError { .. } => EventTopic::DeadLetterQueue,
        }
    }

    /// Stable event type name used by notification consumers.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BudgetEscrowed { .. } => "budget_escrowed",
            Self::SubmissionSettled { .. } => "submission_settled",
            Self::SubmissionRejected { .. } => "submission_rejected",
            Self::PayoutCredited { .. } => "payout_credited",
            Self::AuditRecorded(_) => "audit_recorded",
            Self::CriticalError { .. } => "critical_error",
        }
    }

    /// The account this event should be delivered to.
    ///
    /// Review outcomes are addressed to the clipper who submitted; escrow
    /// movements to the advertiser who funded them.
    #[must_use]
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::BudgetEscrowed { advertiser_id, .. } => Some(*advertiser_id),
            Self::SubmissionSettled { clipper_id, .. }
            | Self::SubmissionRejected { clipper_id, .. }
            | Self::PayoutCredited { clipper_id, .. } => Some(*clipper_id),
            Self::AuditRecorded(record) => record.actor,
            Self::CriticalError { .. } => None,
        }
    }

    /// Related campaign, if any.
    #[must_use]
    pub fn campaign_id(&self) -> Option<CampaignId> {
        match self {
            Self::BudgetEscrowed { campaign_id, .. }
            | Self::SubmissionSettled { campaign_id, .. }
            | Self::SubmissionRejected { campaign_id, .. }
            | Self::PayoutCredited { campaign_id, .. } => Some(*campaign_id),
            Self::AuditRecorded(_) | Self::CriticalError { .. } => None,
        }
    }

    /// Related submission, if any.
    #[must_use]
    pub fn submission_id(&self) -> Option<SubmissionId> {
        match self {
            Self::SubmissionSettled { submission_id, .. }
            | Self::SubmissionRejected { submission_id, .. }
            | Self::PayoutCredited { submission_id, .. } => Some(*submission_id),
            _ => None,
        }
    }

    /// Monetary amount carried by the event, if any.
    #[must_use]
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::BudgetEscrowed { delta, .. } => Some(*delta),
            Self::SubmissionSettled { amount_earned, .. } => Some(*amount_earned),
            Self::PayoutCredited { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

/// Action recorded in an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    CreateCampaign,
    IncreaseCampaignBudget,
    SettleSubmission,
    RejectSubmission,
    CreditPayout,
}

/// Who did what to which record, with the values before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Calling principal. `None` for system-initiated work such as payouts.
    pub actor: Option<AccountId>,
    pub action: AuditAction,
    /// Record identifier, e.g. `campaign:<uuid>`.
    pub target: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub at: Timestamp,
}

/// Sequence carried by envelopes that were not read from the outbox.
pub const UNSEQUENCED: u64 = u64::MAX;

/// Envelope for every event on the bus.
///
/// `event_id` is stable across redeliveries of the same outbox entry, so
/// consumers can discard duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    /// Outbox sequence number, monotonic per store.
    pub sequence: u64,
    pub committed_at: Timestamp,
    pub event: MarketEvent,
}

impl EventEnvelope {
    /// Wrap an event that was committed at `committed_at`.
    #[must_use]
    pub fn new(sequence: u64, committed_at: Timestamp, event: MarketEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            sequence,
            committed_at,
            event,
        }
    }

    /// A dead letter raised by a consumer. Published directly, not through
    /// the outbox, so it carries [`UNSEQUENCED`].
    #[must_use]
    pub fn dead_letter(component: &str, error: impl ToString, at: Timestamp) -> Self {
        Self::new(
            UNSEQUENCED,
            at,
            MarketEvent::CriticalError {
                component: component.to_string(),
                error: error.to_string(),
            },
        )
    }

    /// Topic of the wrapped event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        self.event.topic()
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Budget escrow movements.
    Escrow,
    /// Submission review outcomes.
    Review,
    /// Clipper payout credits.
    Payout,
    /// Compliance audit records.
    Audit,
    /// Dead Letter Queue for critical errors.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Addressed accounts to include. Empty means all accounts.
    pub accounts: Vec<AccountId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            accounts: Vec::new(),
        }
    }

    /// Create a filter for events addressed to specific accounts.
    #[must_use]
    pub fn for_accounts(accounts: Vec<AccountId>) -> Self {
        Self {
            topics: Vec::new(),
            accounts,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&envelope.topic());

        let account_match = self.accounts.is_empty()
            || envelope
                .event
                .account_id()
                .is_some_and(|account| self.accounts.contains(&account));

        topic_match && account_match
    }
}
