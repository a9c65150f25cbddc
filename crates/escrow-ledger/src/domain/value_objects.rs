//! Request and result shapes of the escrow operations.

use super::entities::{Campaign, CampaignStatus, LedgerTransaction, Submission};
use serde::{Deserialize, Serialize};
use shared_types::{AccountId, Amount, CampaignId, Currency, TransactionId};

/// Result of a committed budget increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetIncrease {
    pub campaign: Campaign,
    /// Amount moved from `available` to `pending`.
    pub delta: Amount,
    pub transaction: LedgerTransaction,
}

/// Result of a committed approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub submission: Submission,
    pub amount_earned: Amount,
    pub transaction: LedgerTransaction,
}

/// Result of a committed rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub submission: Submission,
}

/// Result of crediting an approved submission's earnings to its clipper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutOutcome {
    Credited { transaction: LedgerTransaction },
    /// A previous call already credited this submission; nothing was written.
    AlreadyCredited { transaction_id: TransactionId },
}

impl PayoutOutcome {
    #[must_use]
    pub fn is_credited(&self) -> bool {
        matches!(self, Self::Credited { .. })
    }
}

/// Budget audit of one campaign.
///
/// The pool is consistent when everything drawn down is accounted for by
/// settlement transactions and by approved submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReconciliation {
    pub campaign_id: CampaignId,
    pub budget: Amount,
    pub remaining_budget: Amount,
    /// `budget - remaining_budget`.
    pub drawn_down: Amount,
    /// Sum of settlement transaction amounts, as a positive number.
    pub settled_total: Amount,
    /// Sum of `amount_earned` over approved submissions.
    pub approved_total: Amount,
    pub approved_count: usize,
    /// Sum of escrow transaction amounts, as a positive number.
    pub escrowed_total: Amount,
    pub consistent: bool,
}

/// Provisioning input for a campaign created by the campaign service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCampaign {
    pub advertiser_id: AccountId,
    pub currency: Currency,
    pub budget: Amount,
    pub price_per_submission: Amount,
    pub status: CampaignStatus,
}
