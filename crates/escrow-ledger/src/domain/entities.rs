//! # Ledger Entities
//!
//! Rows held by the ledger store. Every row is owned by exactly one store
//! and mutated only through a committed unit of work.
//!
//! | Row | Key | Mutable fields |
//! |-----|-----|----------------|
//! | `Balance` | (account, currency) | `available`, `pending` |
//! | `Campaign` | campaign id | `budget`, `remaining_budget`, `status` |
//! | `Submission` | submission id | `status`, `reviewed_at` |
//! | `PayoutMarker` | submission id | none (write-once) |
//! | `LedgerTransaction` | append position | none (append-only) |

use super::errors::LedgerError;
use serde::{Deserialize, Serialize};
use shared_types::{AccountId, Amount, CampaignId, Currency, SubmissionId, Timestamp, TransactionId};
use std::fmt;

// =============================================================================
// BALANCE
// =============================================================================

/// Funds held by one account in one currency.
///
/// `available` is freely spendable. `pending` is escrowed against campaign
/// budgets. Both are never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub currency: Currency,
    pub available: Amount,
    pub pending: Amount,
}

impl Balance {
    /// A freshly created, empty balance row.
    #[must_use]
    pub fn zero(account_id: AccountId, currency: Currency) -> Self {
        Self {
            account_id,
            currency,
            available: Amount::ZERO,
            pending: Amount::ZERO,
        }
    }

    /// `available + pending`.
    #[must_use]
    pub fn total(&self) -> Amount {
        self.available + self.pending
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.available >= Amount::ZERO && self.pending >= Amount::ZERO
    }

    /// Add `amount` to `available`. The total must stay representable.
    pub(crate) fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let available = self.available.checked_add(amount);
        let total = self.total().checked_add(amount);
        match (available, total) {
            (Some(available), Some(_)) => {
                self.available = available;
                Ok(())
            }
            _ => Err(LedgerError::invalid_amount(amount, "balance would overflow")),
        }
    }

    /// Move `delta` from `available` to `pending`. The caller checks funds.
    pub(crate) fn escrow(&mut self, delta: Amount) -> Result<(), LedgerError> {
        let overflow = || LedgerError::invalid_amount(delta, "escrow would overflow");
        self.available = self.available.checked_sub(delta).ok_or_else(overflow)?;
        self.pending = self.pending.checked_add(delta).ok_or_else(overflow)?;
        Ok(())
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// Kind of balance mutation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Advertiser funds moved from `available` into campaign escrow.
    BudgetEscrow,
    /// Campaign pool drawn down for an approved submission.
    SubmissionPayout,
    /// Approved submission earnings credited to the clipper.
    PayoutCredit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// Immutable record of one committed balance or budget mutation.
///
/// `amount` is signed: negative debits the account, positive credits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Amount,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub related_campaign_id: Option<CampaignId>,
    pub related_submission_id: Option<SubmissionId>,
    pub created_at: Timestamp,
}

impl LedgerTransaction {
    /// A completed transaction with a fresh id.
    #[must_use]
    pub fn completed(
        account_id: AccountId,
        tx_type: TransactionType,
        amount: Amount,
        currency: Currency,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            tx_type,
            amount,
            currency,
            status: TransactionStatus::Completed,
            related_campaign_id: None,
            related_submission_id: None,
            created_at,
        }
    }

    #[must_use]
    pub fn for_campaign(mut self, campaign_id: CampaignId) -> Self {
        self.related_campaign_id = Some(campaign_id);
        self
    }

    #[must_use]
    pub fn for_submission(mut self, submission_id: SubmissionId) -> Self {
        self.related_submission_id = Some(submission_id);
        self
    }
}

// =============================================================================
// CAMPAIGN
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    /// Whether the budget may still be increased.
    #[must_use]
    pub fn accepts_budget_increase(self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Whether approved submissions may be settled against the pool.
    ///
    /// A paused campaign stops accepting new submissions but still pays for
    /// work already submitted.
    #[must_use]
    pub fn accepts_settlement(self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "DRAFT",
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// Budget fields of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub advertiser_id: AccountId,
    pub currency: Currency,
    /// Total funds committed to the campaign so far.
    pub budget: Amount,
    /// Portion of `budget` not yet paid out.
    pub remaining_budget: Amount,
    /// Fixed amount paid for each approved submission.
    pub price_per_submission: Amount,
    pub status: CampaignStatus,
}

impl Campaign {
    /// `budget - remaining_budget`.
    #[must_use]
    pub fn spent(&self) -> Amount {
        self.budget - self.remaining_budget
    }

    /// Raise `budget` and `remaining_budget` by `delta`.
    pub(crate) fn raise_budget(&mut self, delta: Amount) -> Result<(), LedgerError> {
        let overflow = || LedgerError::invalid_amount(delta, "budget would overflow");
        let budget = self.budget.checked_add(delta).ok_or_else(overflow)?;
        let remaining = self.remaining_budget.checked_add(delta).ok_or_else(overflow)?;
        self.budget = budget;
        self.remaining_budget = remaining;
        Ok(())
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.budget > Amount::ZERO
            && self.remaining_budget >= Amount::ZERO
            && self.remaining_budget <= self.budget
            && self.price_per_submission > Amount::ZERO
    }
}

// =============================================================================
// SUBMISSION
// =============================================================================

/// Review state of a submission.
///
/// The payload exists only in the state that owns it: an earned amount
/// only once approved, reviewer notes only once rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Approved { amount_earned: Amount },
    Rejected { reviewer_notes: String },
}

impl SubmissionStatus {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved { .. } => "APPROVED",
            Self::Rejected { .. } => "REJECTED",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn amount_earned(&self) -> Option<Amount> {
        match self {
            Self::Approved { amount_earned } => Some(*amount_earned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub campaign_id: CampaignId,
    pub clipper_id: AccountId,
    pub status: SubmissionStatus,
    pub submitted_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

// =============================================================================
// PAYOUT MARKER
// =============================================================================

/// Proof that an approved submission's earnings reached the clipper.
///
/// At most one exists per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutMarker {
    pub submission_id: SubmissionId,
    pub clipper_id: AccountId,
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub credited_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;
    use rust_decimal_macros::dec;

    fn campaign(budget: Amount, remaining: Amount) -> Campaign {
        Campaign {
            id: CampaignId::new(),
            advertiser_id: AccountId::new(),
            currency: Currency::USD,
            budget,
            remaining_budget: remaining,
            price_per_submission: dec!(10),
            status: CampaignStatus::Active,
        }
    }

    #[test]
    fn test_balance_consistency() {
        let mut balance = Balance::zero(AccountId::new(), Currency::USD);
        assert!(balance.is_consistent());

        balance.available = dec!(-0.01);
        assert!(!balance.is_consistent());
    }

    #[test]
    fn test_credit_refuses_unrepresentable_total() {
        let mut balance = Balance::zero(AccountId::new(), Currency::USD);
        balance.pending = Amount::MAX - dec!(100);

        balance.credit(dec!(100)).unwrap();
        assert_eq!(balance.available, dec!(100));

        let err = balance.credit(dec!(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert_eq!(balance.available, dec!(100));
    }

    #[test]
    fn test_escrow_moves_available_to_pending() {
        let mut balance = Balance::zero(AccountId::new(), Currency::USD);
        balance.credit(dec!(50)).unwrap();

        balance.escrow(dec!(20)).unwrap();
        assert_eq!(balance.available, dec!(30));
        assert_eq!(balance.pending, dec!(20));
        assert_eq!(balance.total(), dec!(50));
    }

    #[test]
    fn test_raise_budget_is_checked() {
        let mut pool = campaign(dec!(100), dec!(40));
        pool.raise_budget(dec!(60)).unwrap();
        assert_eq!(pool.budget, dec!(160));
        assert_eq!(pool.remaining_budget, dec!(100));

        let mut full = campaign(Amount::MAX, Amount::MAX);
        assert!(full.raise_budget(dec!(1)).is_err());
        assert_eq!(full.budget, Amount::MAX);
    }

    #[test]
    fn test_campaign_consistency() {
        assert!(campaign(dec!(100), dec!(100)).is_consistent());
        assert!(campaign(dec!(100), dec!(0)).is_consistent());
        assert!(!campaign(dec!(100), dec!(101)).is_consistent());
        assert!(!campaign(dec!(100), dec!(-1)).is_consistent());
        assert!(!campaign(dec!(0), dec!(0)).is_consistent());
    }

    #[test]
    fn test_campaign_status_rules() {
        assert!(CampaignStatus::Draft.accepts_budget_increase());
        assert!(!CampaignStatus::Completed.accepts_budget_increase());
        assert!(CampaignStatus::Paused.accepts_settlement());
        assert!(!CampaignStatus::Draft.accepts_settlement());
        assert!(!CampaignStatus::Completed.accepts_settlement());
    }

    #[test]
    fn test_submission_status_serializes_tagged() {
        let status = SubmissionStatus::Approved {
            amount_earned: dec!(150),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "APPROVED");
        assert_eq!(json["amount_earned"], "150");
        assert_eq!(status.amount_earned(), Some(dec!(150)));
        assert!(status.is_terminal());
    }

    #[test]
    fn test_transaction_type_wire_names() {
        let json = serde_json::to_string(&TransactionType::BudgetEscrow).unwrap();
        assert_eq!(json, "\"BUDGET_ESCROW\"");
    }
}
