//! # Unit of Work
//!
//! Optimistic atomic units over the ledger store.
//!
//! A unit reads rows through a [`RowReader`], remembering the version of
//! every row it saw, and stages every write in a [`ChangeSet`]. Commit
//! re-checks those versions under the store's commit lock and applies all
//! staged writes or none of them.
//!
//! ```text
//! begin ──read──→ [reads: key → version]
//!       ──stage─→ [writes, transactions, events]
//!       ──commit→ versions unchanged? ──yes──→ apply all
//!                                     └─no───→ Conflict (retry)
//! ```
//!
//! Staged rows shadow the store: a unit that writes a row and reads it again
//! sees its own write.

use super::entities::{Balance, Campaign, LedgerTransaction, PayoutMarker, Submission};
use super::errors::{EntityKind, LedgerError};
use crate::ports::outbound::{LedgerStore, RowReader};
use market_telemetry::CONFLICT_RETRIES;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared_bus::MarketEvent;
use shared_types::{AccountId, CampaignId, Currency, SubmissionId, Timestamp};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Version of a row that does not exist yet.
pub const ABSENT: u64 = 0;

/// A row together with its commit version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub row: T,
}

/// Identity of a versioned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKey {
    Balance(AccountId, Currency),
    Campaign(CampaignId),
    Submission(SubmissionId),
    PayoutMarker(SubmissionId),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balance(account, currency) => write!(f, "balance:{account}:{currency}"),
            Self::Campaign(id) => write!(f, "campaign:{id}"),
            Self::Submission(id) => write!(f, "submission:{id}"),
            Self::PayoutMarker(id) => write!(f, "payout:{id}"),
        }
    }
}

/// Everything a unit of work observed and staged.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Version observed for every row read or written.
    pub reads: HashMap<RowKey, u64>,
    pub balances: HashMap<(AccountId, Currency), Balance>,
    pub campaigns: HashMap<CampaignId, Campaign>,
    pub submissions: HashMap<SubmissionId, Submission>,
    pub payout_markers: HashMap<SubmissionId, PayoutMarker>,
    /// Appended in order.
    pub transactions: Vec<LedgerTransaction>,
    /// Outbox events, in emission order.
    pub events: Vec<MarketEvent>,
    pub committed_at: Timestamp,
}

impl ChangeSet {
    fn new(committed_at: Timestamp) -> Self {
        Self {
            reads: HashMap::new(),
            balances: HashMap::new(),
            campaigns: HashMap::new(),
            submissions: HashMap::new(),
            payout_markers: HashMap::new(),
            transactions: Vec::new(),
            events: Vec::new(),
            committed_at,
        }
    }

    /// True when nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
            && self.campaigns.is_empty()
            && self.submissions.is_empty()
            && self.payout_markers.is_empty()
            && self.transactions.is_empty()
            && self.events.is_empty()
    }

    /// Check the ledger invariants over every staged row.
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        if let Some(balance) = self.balances.values().find(|b| !b.is_consistent()) {
            return Err(LedgerError::InvariantViolation(format!(
                "balance {}:{} would become available={} pending={}",
                balance.account_id, balance.currency, balance.available, balance.pending
            )));
        }
        if let Some(campaign) = self.campaigns.values().find(|c| !c.is_consistent()) {
            return Err(LedgerError::InvariantViolation(format!(
                "campaign {} would become budget={} remaining={}",
                campaign.id, campaign.budget, campaign.remaining_budget
            )));
        }
        Ok(())
    }
}

/// What a successful commit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub committed_at: Timestamp,
    /// Outbox sequence numbers assigned to the unit's events.
    pub sequences: Vec<u64>,
    pub transactions: usize,
}

impl CommitReceipt {
    /// Receipt of a unit that had nothing to write.
    #[must_use]
    pub fn empty(committed_at: Timestamp) -> Self {
        Self {
            committed_at,
            sequences: Vec::new(),
            transactions: 0,
        }
    }
}

/// An open atomic unit.
pub struct UnitOfWork<'a> {
    reader: &'a dyn RowReader,
    changes: ChangeSet,
}

impl<'a> UnitOfWork<'a> {
    #[must_use]
    pub fn new(reader: &'a dyn RowReader, now: Timestamp) -> Self {
        Self {
            reader,
            changes: ChangeSet::new(now),
        }
    }

    /// Commit timestamp for rows and transactions created by this unit.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.changes.committed_at
    }

    fn observe(&mut self, key: RowKey, version: u64) {
        self.changes.reads.entry(key).or_insert(version);
    }

    fn observe_current(&mut self, key: RowKey) {
        if self.changes.reads.contains_key(&key) {
            return;
        }
        let version = match key {
            RowKey::Balance(account, currency) => self
                .reader
                .read_balance(account, currency)
                .map_or(ABSENT, |v| v.version),
            RowKey::Campaign(id) => self.reader.read_campaign(id).map_or(ABSENT, |v| v.version),
            RowKey::Submission(id) => self
                .reader
                .read_submission(id)
                .map_or(ABSENT, |v| v.version),
            RowKey::PayoutMarker(id) => self
                .reader
                .read_payout_marker(id)
                .map_or(ABSENT, |v| v.version),
        };
        self.observe(key, version);
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn balance(&mut self, account_id: AccountId, currency: Currency) -> Option<Balance> {
        if let Some(staged) = self.changes.balances.get(&(account_id, currency)) {
            return Some(staged.clone());
        }
        let found = self.reader.read_balance(account_id, currency);
        self.observe(
            RowKey::Balance(account_id, currency),
            found.as_ref().map_or(ABSENT, |v| v.version),
        );
        found.map(|v| v.row)
    }

    /// Existing balance, or a zeroed row staged for creation.
    pub fn ensure_balance(&mut self, account_id: AccountId, currency: Currency) -> Balance {
        match self.balance(account_id, currency) {
            Some(balance) => balance,
            None => {
                let balance = Balance::zero(account_id, currency);
                self.put_balance(balance.clone());
                balance
            }
        }
    }

    pub fn campaign(&mut self, id: CampaignId) -> Result<Campaign, LedgerError> {
        if let Some(staged) = self.changes.campaigns.get(&id) {
            return Ok(staged.clone());
        }
        let found = self.reader.read_campaign(id);
        self.observe(
            RowKey::Campaign(id),
            found.as_ref().map_or(ABSENT, |v| v.version),
        );
        found
            .map(|v| v.row)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Campaign, id))
    }

    pub fn submission(&mut self, id: SubmissionId) -> Result<Submission, LedgerError> {
        if let Some(staged) = self.changes.submissions.get(&id) {
            return Ok(staged.clone());
        }
        let found = self.reader.read_submission(id);
        self.observe(
            RowKey::Submission(id),
            found.as_ref().map_or(ABSENT, |v| v.version),
        );
        found
            .map(|v| v.row)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Submission, id))
    }

    pub fn payout_marker(&mut self, submission_id: SubmissionId) -> Option<PayoutMarker> {
        if let Some(staged) = self.changes.payout_markers.get(&submission_id) {
            return Some(staged.clone());
        }
        let found = self.reader.read_payout_marker(submission_id);
        self.observe(
            RowKey::PayoutMarker(submission_id),
            found.as_ref().map_or(ABSENT, |v| v.version),
        );
        found.map(|v| v.row)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    pub fn put_balance(&mut self, balance: Balance) {
        self.observe_current(RowKey::Balance(balance.account_id, balance.currency));
        self.changes
            .balances
            .insert((balance.account_id, balance.currency), balance);
    }

    pub fn put_campaign(&mut self, campaign: Campaign) {
        self.observe_current(RowKey::Campaign(campaign.id));
        self.changes.campaigns.insert(campaign.id, campaign);
    }

    pub fn put_submission(&mut self, submission: Submission) {
        self.observe_current(RowKey::Submission(submission.id));
        self.changes.submissions.insert(submission.id, submission);
    }

    pub fn put_payout_marker(&mut self, marker: PayoutMarker) {
        self.observe_current(RowKey::PayoutMarker(marker.submission_id));
        self.changes
            .payout_markers
            .insert(marker.submission_id, marker);
    }

    pub fn append_transaction(&mut self, transaction: LedgerTransaction) {
        self.changes.transactions.push(transaction);
    }

    /// Stage an event for the outbox. Published only if the unit commits.
    pub fn emit(&mut self, event: MarketEvent) {
        self.changes.events.push(event);
    }

    #[must_use]
    pub fn into_changes(self) -> ChangeSet {
        self.changes
    }
}

// =============================================================================
// RUNNING UNITS
// =============================================================================

/// How `run_atomic` reacts to version conflicts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Upper bound of the random pause before each retry, scaled by attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    fn pause(&self, attempt: u32) {
        let ceiling = self.backoff.as_micros() as u64 * u64::from(attempt);
        if ceiling == 0 {
            return;
        }
        let micros = rand::thread_rng().gen_range(0..=ceiling);
        std::thread::sleep(Duration::from_micros(micros));
    }
}

/// Run `work` inside a fresh unit and commit it, retrying on `Conflict`.
///
/// `work` may run more than once and must derive everything from what it
/// reads through the unit. Errors other than `Conflict` end the call with
/// nothing applied.
pub fn run_atomic<S, T, F>(
    store: &S,
    now: Timestamp,
    policy: &RetryPolicy,
    mut work: F,
) -> Result<(T, CommitReceipt), LedgerError>
where
    S: LedgerStore,
    F: FnMut(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
{
    let mut attempt = 0;
    loop {
        let mut uow = UnitOfWork::new(store, now);
        let outcome = work(&mut uow)?;

        match store.commit(uow.into_changes()) {
            Ok(receipt) => return Ok((outcome, receipt)),
            Err(LedgerError::Conflict(key)) if attempt < policy.max_retries => {
                attempt += 1;
                CONFLICT_RETRIES.inc();
                debug!(%key, attempt, "Version conflict, retrying unit of work");
                policy.pause(attempt);
            }
            Err(e) => return Err(e),
        }
    }
}
