//! Outbound (Driven) ports for the escrow ledger.
//!
//! These traits define what the engine needs from storage, durability,
//! time and the post-commit delivery path.

use crate::domain::entities::{Balance, Campaign, LedgerTransaction, PayoutMarker, Submission};
use crate::domain::errors::{EntityKind, LedgerError};
use crate::domain::unit_of_work::{ChangeSet, CommitReceipt, Versioned};
use serde::{Deserialize, Serialize};
use shared_bus::EventEnvelope;
use shared_types::{AccountId, CampaignId, Currency, SubmissionId, Timestamp};

/// Versioned point reads used by units of work.
pub trait RowReader: Send + Sync {
    fn read_balance(&self, account_id: AccountId, currency: Currency) -> Option<Versioned<Balance>>;

    fn read_campaign(&self, id: CampaignId) -> Option<Versioned<Campaign>>;

    fn read_submission(&self, id: SubmissionId) -> Option<Versioned<Submission>>;

    fn read_payout_marker(&self, submission_id: SubmissionId) -> Option<Versioned<PayoutMarker>>;
}

/// A campaign with its full trail, read under one consistent snapshot.
#[derive(Debug, Clone)]
pub struct CampaignLedger {
    pub campaign: Campaign,
    pub transactions: Vec<LedgerTransaction>,
    pub submissions: Vec<Submission>,
}

/// Transactional storage for ledger rows and the outbox.
///
/// # Commit contract
///
/// `commit` applies a [`ChangeSet`] only if every row version it recorded is
/// still current, every staged row satisfies the ledger invariants and the
/// commit lock was acquired within the store's timeout. Otherwise it returns
/// `Conflict`, `InvariantViolation` or `Timeout` and applies nothing.
pub trait LedgerStore: RowReader {
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, LedgerError>;

    /// Transactions booked against an account, oldest first.
    fn transactions_for_account(&self, account_id: AccountId) -> Vec<LedgerTransaction>;

    /// Transactions related to a campaign, oldest first.
    fn transactions_for_campaign(&self, campaign_id: CampaignId) -> Vec<LedgerTransaction>;

    fn submissions_for_campaign(&self, campaign_id: CampaignId) -> Vec<Submission>;

    fn campaign_ledger(&self, campaign_id: CampaignId) -> Option<CampaignLedger>;

    /// Retained outbox entries with `sequence >= from`, in sequence order.
    fn outbox_from(&self, from: u64, limit: usize) -> Vec<EventEnvelope>;

    /// Entries not yet handled by every registered consumer.
    fn outbox_len(&self) -> usize;

    fn get_balance(&self, account_id: AccountId, currency: Currency) -> Result<Balance, LedgerError> {
        self.read_balance(account_id, currency)
            .map(|v| v.row)
            .ok_or_else(|| LedgerError::NotFound {
                entity: EntityKind::Balance,
                id: format!("{account_id}:{currency}"),
            })
    }

    fn get_campaign(&self, id: CampaignId) -> Result<Campaign, LedgerError> {
        self.read_campaign(id)
            .map(|v| v.row)
            .ok_or_else(|| LedgerError::NotFound {
                entity: EntityKind::Campaign,
                id: id.to_string(),
            })
    }

    fn get_submission(&self, id: SubmissionId) -> Result<Submission, LedgerError> {
        self.read_submission(id)
            .map(|v| v.row)
            .ok_or_else(|| LedgerError::NotFound {
                entity: EntityKind::Submission,
                id: id.to_string(),
            })
    }
}

/// Durable per-consumer delivery offsets.
///
/// An outbox entry is retained until every registered consumer has
/// acknowledged it. With no consumers registered nothing is pruned.
pub trait ConsumerOffsets: Send + Sync {
    /// Register `consumer` if it is new and return its next unhandled
    /// sequence. A new consumer starts at the oldest retained entry.
    fn register_consumer(&self, consumer: &str) -> Result<u64, LedgerError>;

    /// Mark every sequence up to and including `sequence` handled by
    /// `consumer`. Returns how many outbox entries were pruned.
    fn acknowledge(&self, consumer: &str, sequence: u64) -> Result<usize, LedgerError>;

    fn consumer_offset(&self, consumer: &str) -> Option<u64>;
}

// =============================================================================
// DURABILITY
// =============================================================================

/// Rows and entries a commit writes, with their final versions and
/// positions. Also the shape of a full snapshot when loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalBatch {
    pub balances: Vec<Versioned<Balance>>,
    pub campaigns: Vec<Versioned<Campaign>>,
    pub submissions: Vec<Versioned<Submission>>,
    pub payout_markers: Vec<Versioned<PayoutMarker>>,
    /// (append position, transaction)
    pub transactions: Vec<(u64, LedgerTransaction)>,
    pub outbox: Vec<EventEnvelope>,
    /// Next outbox sequence after this batch.
    pub next_sequence: u64,
    /// (consumer, next unhandled sequence). Only filled by `load`.
    #[serde(default)]
    pub consumer_offsets: Vec<(String, u64)>,
}

/// Durable write-ahead storage behind the in-memory store.
///
/// `persist` is called under the commit lock before a commit becomes
/// visible. A failure aborts the commit.
pub trait Journal: Send + Sync {
    fn persist(&self, batch: &JournalBatch) -> Result<(), LedgerError>;

    /// Store `consumer`'s offset and drop the `pruned` outbox entries.
    fn record_offset(&self, consumer: &str, next: u64, pruned: &[u64]) -> Result<(), LedgerError>;

    /// Everything persisted so far, transactions in append order.
    fn load(&self) -> Result<JournalBatch, LedgerError>;
}

// =============================================================================
// POST-COMMIT
// =============================================================================

/// Told about every commit that staged outbox events.
pub trait CommitListener: Send + Sync {
    fn committed(&self, receipt: &CommitReceipt);
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}

/// Fixed time source for tests.
#[cfg(test)]
pub struct FixedTimeSource(pub Timestamp);

#[cfg(test)]
impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        self.0
    }
}
