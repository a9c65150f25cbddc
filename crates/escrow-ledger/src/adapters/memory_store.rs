//! # In-Memory Ledger Store
//!
//! Versioned rows behind a single `parking_lot::RwLock`. Units of work read
//! through shared guards held only for the duration of one point read;
//! commit takes the exclusive guard with a bounded wait, validates, then
//! applies.
//!
//! With a [`Journal`] attached every commit is persisted before it becomes
//! visible, and [`MemoryLedgerStore::with_journal`] rebuilds the rows from
//! the journal on open.
//!
//! Outbox entries stay until every registered consumer has acknowledged
//! them, so a consumer that falls behind or restarts still sees them.

use crate::domain::entities::{Balance, Campaign, LedgerTransaction, PayoutMarker, Submission};
use crate::domain::errors::LedgerError;
use crate::domain::unit_of_work::{ChangeSet, CommitReceipt, RowKey, Versioned, ABSENT};
use crate::ports::outbound::{
    CampaignLedger, ConsumerOffsets, Journal, JournalBatch, LedgerStore, RowReader,
};
use parking_lot::RwLock;
use shared_bus::EventEnvelope;
use shared_types::{AccountId, CampaignId, Currency, SubmissionId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Longest a commit waits for the exclusive lock.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<(AccountId, Currency), Versioned<Balance>>,
    campaigns: HashMap<CampaignId, Versioned<Campaign>>,
    submissions: HashMap<SubmissionId, Versioned<Submission>>,
    payout_markers: HashMap<SubmissionId, Versioned<PayoutMarker>>,
    transactions: Vec<LedgerTransaction>,
    tx_by_account: HashMap<AccountId, Vec<usize>>,
    tx_by_campaign: HashMap<CampaignId, Vec<usize>>,
    submissions_by_campaign: HashMap<CampaignId, Vec<SubmissionId>>,
    outbox: BTreeMap<u64, EventEnvelope>,
    next_sequence: u64,
    /// consumer -> next unhandled sequence
    consumers: BTreeMap<String, u64>,
}

impl LedgerState {
    fn version_of(&self, key: &RowKey) -> u64 {
        match key {
            RowKey::Balance(account, currency) => self
                .balances
                .get(&(*account, *currency))
                .map_or(ABSENT, |v| v.version),
            RowKey::Campaign(id) => self.campaigns.get(id).map_or(ABSENT, |v| v.version),
            RowKey::Submission(id) => self.submissions.get(id).map_or(ABSENT, |v| v.version),
            RowKey::PayoutMarker(id) => self.payout_markers.get(id).map_or(ABSENT, |v| v.version),
        }
    }

    fn validate(&self, changes: &ChangeSet) -> Result<(), LedgerError> {
        for (key, seen) in &changes.reads {
            if self.version_of(key) != *seen {
                return Err(LedgerError::Conflict(key.to_string()));
            }
        }
        Ok(())
    }

    /// Assign versions, positions and sequences without applying anything.
    fn prepare(&self, changes: ChangeSet) -> JournalBatch {
        let next = |key: RowKey| self.version_of(&key) + 1;

        let balances = changes
            .balances
            .into_values()
            .map(|row| Versioned {
                version: next(RowKey::Balance(row.account_id, row.currency)),
                row,
            })
            .collect();
        let campaigns = changes
            .campaigns
            .into_values()
            .map(|row| Versioned {
                version: next(RowKey::Campaign(row.id)),
                row,
            })
            .collect();
        let submissions = changes
            .submissions
            .into_values()
            .map(|row| Versioned {
                version: next(RowKey::Submission(row.id)),
                row,
            })
            .collect();
        let payout_markers = changes
            .payout_markers
            .into_values()
            .map(|row| Versioned {
                version: next(RowKey::PayoutMarker(row.submission_id)),
                row,
            })
            .collect();

        let base = self.transactions.len() as u64;
        let transactions = changes
            .transactions
            .into_iter()
            .enumerate()
            .map(|(i, tx)| (base + i as u64, tx))
            .collect();

        let committed_at = changes.committed_at;
        let outbox: Vec<EventEnvelope> = changes
            .events
            .into_iter()
            .enumerate()
            .map(|(i, event)| EventEnvelope::new(self.next_sequence + i as u64, committed_at, event))
            .collect();
        let next_sequence = self.next_sequence + outbox.len() as u64;

        JournalBatch {
            balances,
            campaigns,
            submissions,
            payout_markers,
            transactions,
            outbox,
            next_sequence,
            consumer_offsets: Vec::new(),
        }
    }

    fn apply(&mut self, batch: JournalBatch) {
        for v in batch.balances {
            self.balances.insert((v.row.account_id, v.row.currency), v);
        }
        for v in batch.campaigns {
            self.campaigns.insert(v.row.id, v);
        }
        for v in batch.submissions {
            if !self.submissions.contains_key(&v.row.id) {
                self.submissions_by_campaign
                    .entry(v.row.campaign_id)
                    .or_default()
                    .push(v.row.id);
            }
            self.submissions.insert(v.row.id, v);
        }
        for v in batch.payout_markers {
            self.payout_markers.insert(v.row.submission_id, v);
        }
        for (_, tx) in batch.transactions {
            let position = self.transactions.len();
            self.tx_by_account
                .entry(tx.account_id)
                .or_default()
                .push(position);
            if let Some(campaign_id) = tx.related_campaign_id {
                self.tx_by_campaign
                    .entry(campaign_id)
                    .or_default()
                    .push(position);
            }
            self.transactions.push(tx);
        }
        for envelope in batch.outbox {
            self.outbox.insert(envelope.sequence, envelope);
        }
        self.next_sequence = self.next_sequence.max(batch.next_sequence);
        self.consumers.extend(batch.consumer_offsets);
    }

    /// Entries below the lowest offset once `consumer` moves to `next`.
    fn prunable(&self, consumer: &str, next: u64) -> Vec<u64> {
        let floor = self
            .consumers
            .iter()
            .map(|(name, offset)| if name == consumer { next } else { *offset })
            .min()
            .unwrap_or(0);
        self.outbox.range(..floor).map(|(seq, _)| *seq).collect()
    }

    fn transactions_at(&self, positions: Option<&Vec<usize>>) -> Vec<LedgerTransaction> {
        positions
            .map(|ps| ps.iter().map(|&p| self.transactions[p].clone()).collect())
            .unwrap_or_default()
    }

    fn submissions_of(&self, campaign_id: CampaignId) -> Vec<Submission> {
        self.submissions_by_campaign
            .get(&campaign_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.submissions.get(id))
                    .map(|v| v.row.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Default ledger store.
pub struct MemoryLedgerStore {
    state: RwLock<LedgerState>,
    journal: Option<Arc<dyn Journal>>,
    config: StoreConfig,
}

impl MemoryLedgerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            journal: None,
            config,
        }
    }

    /// Open a store backed by `journal`, restoring everything it holds.
    pub fn with_journal(journal: Arc<dyn Journal>, config: StoreConfig) -> Result<Self, LedgerError> {
        let snapshot = journal.load()?;
        let mut state = LedgerState::default();

        info!(
            balances = snapshot.balances.len(),
            campaigns = snapshot.campaigns.len(),
            submissions = snapshot.submissions.len(),
            transactions = snapshot.transactions.len(),
            outbox = snapshot.outbox.len(),
            consumers = snapshot.consumer_offsets.len(),
            "Restoring ledger from journal"
        );

        let positions_ok = snapshot
            .transactions
            .iter()
            .enumerate()
            .all(|(i, (position, _))| *position == i as u64);
        if !positions_ok {
            return Err(LedgerError::Storage(
                "journal transaction positions are not contiguous".to_string(),
            ));
        }

        state.apply(snapshot);

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(journal),
            config,
        })
    }

    /// Number of transaction rows.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.state.read().transactions.len()
    }

    /// All balance rows. Intended for invariant checks and reporting.
    #[must_use]
    pub fn all_balances(&self) -> Vec<Balance> {
        self.state
            .read()
            .balances
            .values()
            .map(|v| v.row.clone())
            .collect()
    }

    /// All campaign rows. Intended for invariant checks and reporting.
    #[must_use]
    pub fn all_campaigns(&self) -> Vec<Campaign> {
        self.state
            .read()
            .campaigns
            .values()
            .map(|v| v.row.clone())
            .collect()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowReader for MemoryLedgerStore {
    fn read_balance(&self, account_id: AccountId, currency: Currency) -> Option<Versioned<Balance>> {
        self.state.read().balances.get(&(account_id, currency)).cloned()
    }

    fn read_campaign(&self, id: CampaignId) -> Option<Versioned<Campaign>> {
        self.state.read().campaigns.get(&id).cloned()
    }

    fn read_submission(&self, id: SubmissionId) -> Option<Versioned<Submission>> {
        self.state.read().submissions.get(&id).cloned()
    }

    fn read_payout_marker(&self, submission_id: SubmissionId) -> Option<Versioned<PayoutMarker>> {
        self.state.read().payout_markers.get(&submission_id).cloned()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, LedgerError> {
        if changes.is_empty() {
            return Ok(CommitReceipt::empty(changes.committed_at));
        }

        let mut state = self
            .state
            .try_write_for(self.config.lock_timeout)
            .ok_or(LedgerError::Timeout(self.config.lock_timeout))?;

        state.validate(&changes)?;
        changes.check_invariants()?;

        let committed_at = changes.committed_at;
        let batch = state.prepare(changes);

        if let Some(journal) = &self.journal {
            journal.persist(&batch)?;
        }

        let receipt = CommitReceipt {
            committed_at,
            sequences: batch.outbox.iter().map(|e| e.sequence).collect(),
            transactions: batch.transactions.len(),
        };
        state.apply(batch);

        debug!(
            transactions = receipt.transactions,
            events = receipt.sequences.len(),
            "Unit of work committed"
        );
        Ok(receipt)
    }

    fn transactions_for_account(&self, account_id: AccountId) -> Vec<LedgerTransaction> {
        let state = self.state.read();
        state.transactions_at(state.tx_by_account.get(&account_id))
    }

    fn transactions_for_campaign(&self, campaign_id: CampaignId) -> Vec<LedgerTransaction> {
        let state = self.state.read();
        state.transactions_at(state.tx_by_campaign.get(&campaign_id))
    }

    fn submissions_for_campaign(&self, campaign_id: CampaignId) -> Vec<Submission> {
        self.state.read().submissions_of(campaign_id)
    }

    fn campaign_ledger(&self, campaign_id: CampaignId) -> Option<CampaignLedger> {
        let state = self.state.read();
        let campaign = state.campaigns.get(&campaign_id)?.row.clone();
        Some(CampaignLedger {
            campaign,
            transactions: state.transactions_at(state.tx_by_campaign.get(&campaign_id)),
            submissions: state.submissions_of(campaign_id),
        })
    }

    fn outbox_from(&self, from: u64, limit: usize) -> Vec<EventEnvelope> {
        self.state
            .read()
            .outbox
            .range(from..)
            .take(limit)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    fn outbox_len(&self) -> usize {
        self.state.read().outbox.len()
    }
}

impl ConsumerOffsets for MemoryLedgerStore {
    fn register_consumer(&self, consumer: &str) -> Result<u64, LedgerError> {
        let mut state = self
            .state
            .try_write_for(self.config.lock_timeout)
            .ok_or(LedgerError::Timeout(self.config.lock_timeout))?;

        if let Some(next) = state.consumers.get(consumer) {
            return Ok(*next);
        }

        let start = state
            .outbox
            .keys()
            .next()
            .copied()
            .unwrap_or(state.next_sequence);
        if let Some(journal) = &self.journal {
            journal.record_offset(consumer, start, &[])?;
        }
        state.consumers.insert(consumer.to_string(), start);

        info!(consumer, start, "Registered outbox consumer");
        Ok(start)
    }

    fn acknowledge(&self, consumer: &str, sequence: u64) -> Result<usize, LedgerError> {
        let mut state = self
            .state
            .try_write_for(self.config.lock_timeout)
            .ok_or(LedgerError::Timeout(self.config.lock_timeout))?;

        let current = *state
            .consumers
            .get(consumer)
            .ok_or_else(|| LedgerError::InvalidInput(format!("unknown consumer {consumer}")))?;
        if sequence >= state.next_sequence {
            return Err(LedgerError::InvalidInput(format!(
                "sequence {sequence} was never assigned"
            )));
        }

        let next = current.max(sequence + 1);
        if next == current {
            return Ok(0);
        }

        let pruned = state.prunable(consumer, next);
        if let Some(journal) = &self.journal {
            journal.record_offset(consumer, next, &pruned)?;
        }

        state.consumers.insert(consumer.to_string(), next);
        for seq in &pruned {
            state.outbox.remove(seq);
        }

        debug!(consumer, next, pruned = pruned.len(), "Consumer offset advanced");
        Ok(pruned.len())
    }

    fn consumer_offset(&self, consumer: &str) -> Option<u64> {
        self.state.read().consumers.get(consumer).copied()
    }
}
