//! Inbound (Driving) port for the escrow ledger.
//!
//! Callers are the campaign and review services, after they have
//! authenticated the principal. Every mutating call commits atomically or
//! not at all; events describing it are published only after commit.

use crate::domain::entities::{Balance, Campaign, CampaignStatus, LedgerTransaction, Submission};
use crate::domain::errors::LedgerError;
use crate::domain::value_objects::{
    BudgetIncrease, CampaignReconciliation, NewCampaign, PayoutOutcome, Rejection, Settlement,
};
use shared_types::{AccountId, Amount, CampaignId, Currency, SubmissionId};

/// Escrow ledger API.
pub trait EscrowApi: Send + Sync {
    // =========================================================================
    // ESCROW OPERATIONS
    // =========================================================================

    /// Create a campaign and escrow its whole budget from the advertiser's
    /// available balance in the same unit.
    ///
    /// # Errors
    /// `InvalidAmount`, `CampaignNotActive` for a completed status,
    /// `InsufficientFunds`, and the transient kinds.
    fn create_campaign(&self, campaign: NewCampaign) -> Result<BudgetIncrease, LedgerError>;

    /// Raise a campaign's budget to `new_budget_total`, escrowing the
    /// difference from the advertiser's available balance.
    ///
    /// # Errors
    /// `InvalidAmount`, `NotFound`, `Forbidden`, `CampaignNotActive`,
    /// `InsufficientFunds`, and the transient `Conflict`/`Timeout`/`Storage`.
    fn increase_campaign_budget(
        &self,
        advertiser_id: AccountId,
        campaign_id: CampaignId,
        new_budget_total: Amount,
    ) -> Result<BudgetIncrease, LedgerError>;

    /// Approve a pending submission and pay its price out of the pool.
    ///
    /// # Errors
    /// `NotFound`, `Forbidden`, `AlreadyReviewed`, `CampaignNotActive`,
    /// `InsufficientBudget`, and the transient kinds.
    fn settle_approved_submission(
        &self,
        advertiser_id: AccountId,
        submission_id: SubmissionId,
    ) -> Result<Settlement, LedgerError>;

    /// Reject a pending submission. Moves no money.
    ///
    /// # Errors
    /// `NotFound`, `Forbidden`, `AlreadyReviewed`, `InvalidInput`, and the
    /// transient kinds.
    fn reject_submission(
        &self,
        advertiser_id: AccountId,
        submission_id: SubmissionId,
        reviewer_notes: &str,
    ) -> Result<Rejection, LedgerError>;

    /// Credit an approved submission's earnings to its clipper. Idempotent.
    fn credit_clipper_payout(&self, submission_id: SubmissionId)
        -> Result<PayoutOutcome, LedgerError>;

    fn reconcile_campaign(&self, campaign_id: CampaignId)
        -> Result<CampaignReconciliation, LedgerError>;

    // =========================================================================
    // READS
    // =========================================================================

    fn balance(&self, account_id: AccountId, currency: Currency) -> Result<Balance, LedgerError>;

    /// Existing balance, or a new zeroed one. Exactly one row results even
    /// when called concurrently.
    fn ensure_balance(&self, account_id: AccountId, currency: Currency)
        -> Result<Balance, LedgerError>;

    fn campaign(&self, campaign_id: CampaignId) -> Result<Campaign, LedgerError>;

    fn submission(&self, submission_id: SubmissionId) -> Result<Submission, LedgerError>;

    fn account_transactions(&self, account_id: AccountId) -> Vec<LedgerTransaction>;

    fn campaign_transactions(&self, campaign_id: CampaignId) -> Vec<LedgerTransaction>;

    fn campaign_submissions(&self, campaign_id: CampaignId) -> Vec<Submission>;

    // =========================================================================
    // PROVISIONING
    // =========================================================================

    /// Credit externally deposited funds. Writes no transaction row.
    fn seed_balance(
        &self,
        account_id: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Balance, LedgerError>;

    /// Register a campaign with `remaining_budget = budget` without
    /// escrowing anything. For seeding and tests; funded campaigns go
    /// through [`EscrowApi::create_campaign`].
    fn provision_campaign(&self, campaign: NewCampaign) -> Result<Campaign, LedgerError>;

    /// Register a pending submission against an existing campaign.
    fn provision_submission(
        &self,
        campaign_id: CampaignId,
        clipper_id: AccountId,
    ) -> Result<Submission, LedgerError>;

    fn set_campaign_status(
        &self,
        campaign_id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Campaign, LedgerError>;
}
