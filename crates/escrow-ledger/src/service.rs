//! # Escrow Engine
//!
//! Implements [`EscrowApi`] over any [`LedgerStore`]. The engine is the only
//! component that creates transaction rows. Each operation is one atomic
//! unit: rows, transactions and outbox events commit together or not at
//! all.
//!
//! ## Money movement
//!
//! | Operation | Advertiser balance | Campaign pool | Clipper balance | Transaction |
//! |-----------|--------------------|---------------|-----------------|-------------|
//! | create campaign | `available -= b`, `pending += b` | `budget = remaining = b` | | `BUDGET_ESCROW -b` |
//! | increase budget | `available -= d`, `pending += d` | `budget += d`, `remaining += d` | | `BUDGET_ESCROW -d` |
//! | settle | | `remaining -= price` | | `SUBMISSION_PAYOUT -price` |
//! | reject | | | | none |
//! | credit payout | | | `available += earned` | `PAYOUT_CREDIT +earned` |
//!
//! Settlement pays out of the pool the advertiser already escrowed and does
//! not touch the advertiser's balance a second time. Every amount that
//! grows a row is added with checked arithmetic; a sum outside `Decimal`'s
//! range fails with `InvalidAmount` and commits nothing.

use crate::domain::budget::BudgetTracker;
use crate::domain::entities::{
    Balance, Campaign, CampaignStatus, LedgerTransaction, PayoutMarker, Submission,
    SubmissionStatus, TransactionType,
};
use crate::domain::errors::{EntityKind, LedgerError};
use crate::domain::review::{self, ReviewDecision};
use crate::domain::unit_of_work::{run_atomic, RetryPolicy, UnitOfWork};
use crate::domain::value_objects::{
    BudgetIncrease, CampaignReconciliation, NewCampaign, PayoutOutcome, Rejection, Settlement,
};
use crate::ports::inbound::EscrowApi;
use crate::ports::outbound::{CommitListener, LedgerStore, SystemTimeSource, TimeSource};
use market_telemetry::{
    metric_inc, OperationTimer, BUDGET_INCREASES, ESCROWED_AMOUNT, LEDGER_ERRORS,
    PAYOUTS_CREDITED, REJECTIONS, SETTLEMENTS,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;
use shared_bus::{AuditAction, AuditRecord, MarketEvent};
use shared_types::{AccountId, Amount, CampaignId, Currency, SubmissionId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retries of a unit that lost a version race.
    pub max_conflict_retries: u32,
    /// Upper bound of the jittered pause before a retry.
    pub retry_backoff: Duration,
    /// Minimum trimmed length of reviewer notes on rejection.
    pub min_reviewer_notes_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            retry_backoff: Duration::from_millis(5),
            min_reviewer_notes_len: 10,
        }
    }
}

/// The escrow engine.
pub struct EscrowEngine<S: LedgerStore> {
    store: Arc<S>,
    config: EngineConfig,
    retry: RetryPolicy,
    clock: Arc<dyn TimeSource>,
    listener: Option<Arc<dyn CommitListener>>,
}

impl<S: LedgerStore> EscrowEngine<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let retry = RetryPolicy {
            max_retries: config.max_conflict_retries,
            backoff: config.retry_backoff,
        };
        Self {
            store,
            config,
            retry,
            clock: Arc::new(SystemTimeSource),
            listener: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Notify `listener` after every commit that staged outbox events.
    #[must_use]
    pub fn with_commit_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn atomic<T, F>(&self, work: F) -> Result<T, LedgerError>
    where
        F: FnMut(&mut UnitOfWork<'_>) -> Result<T, LedgerError>,
    {
        let (outcome, receipt) = run_atomic(&*self.store, self.clock.now(), &self.retry, work)?;
        if !receipt.sequences.is_empty() {
            if let Some(listener) = &self.listener {
                listener.committed(&receipt);
            }
        }
        Ok(outcome)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn authorize(
    actor: AccountId,
    campaign: &Campaign,
    entity: EntityKind,
    id: impl fmt::Display,
) -> Result<(), LedgerError> {
    if campaign.advertiser_id != actor {
        return Err(LedgerError::Forbidden {
            actor,
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Move `delta` of the advertiser's available funds into escrow.
/// Returns the balance before and after.
fn escrow_funds(
    uow: &mut UnitOfWork<'_>,
    advertiser_id: AccountId,
    currency: Currency,
    delta: Amount,
) -> Result<(Balance, Balance), LedgerError> {
    let before = uow.ensure_balance(advertiser_id, currency);
    if before.available < delta {
        return Err(LedgerError::InsufficientFunds {
            available: before.available,
            required: delta,
            shortfall: delta - before.available,
            currency,
        });
    }

    let mut after = before.clone();
    after.escrow(delta)?;
    uow.put_balance(after.clone());
    Ok((before, after))
}

fn validate_amount(amount: Amount, currency: Currency, what: &str) -> Result<(), LedgerError> {
    if amount <= Amount::ZERO {
        return Err(LedgerError::invalid_amount(
            amount,
            format!("{what} must be positive"),
        ));
    }
    if !currency.admits(amount) {
        return Err(LedgerError::invalid_amount(
            amount,
            format!(
                "{what} has more than {} decimal places for {currency}",
                currency.minor_units()
            ),
        ));
    }
    Ok(())
}

/// Count and log a failed operation; pass the result through.
fn observe<T>(operation: &'static str, result: Result<T, LedgerError>) -> Result<T, LedgerError> {
    if let Err(e) = &result {
        let kind = e.kind();
        LEDGER_ERRORS
            .with_label_values(&[operation, kind.as_str()])
            .inc();
        if kind.is_transient() {
            warn!(operation, error = %e, "Escrow operation failed");
        } else {
            debug!(operation, error = %e, "Escrow operation refused");
        }
    }
    result
}

fn audit(
    actor: Option<AccountId>,
    action: AuditAction,
    target: String,
    before: serde_json::Value,
    after: serde_json::Value,
    uow: &UnitOfWork<'_>,
) -> MarketEvent {
    MarketEvent::AuditRecorded(AuditRecord {
        actor,
        action,
        target,
        before,
        after,
        at: uow.now(),
    })
}

// =============================================================================
// ESCROW API
// =============================================================================

impl<S: LedgerStore> EscrowApi for EscrowEngine<S> {
    fn create_campaign(&self, new: NewCampaign) -> Result<BudgetIncrease, LedgerError> {
        let _timer = OperationTimer::start("create_campaign");
        let advertiser_id = new.advertiser_id;
        let campaign_id = CampaignId::new();

        let result = self.atomic(|uow| {
            validate_amount(new.budget, new.currency, "budget")?;
            validate_amount(new.price_per_submission, new.currency, "price per submission")?;
            if !new.status.accepts_budget_increase() {
                return Err(LedgerError::CampaignNotActive { status: new.status });
            }

            let currency = new.currency;
            let (before_balance, balance) =
                escrow_funds(uow, advertiser_id, currency, new.budget)?;

            let campaign = Campaign {
                id: campaign_id,
                advertiser_id,
                currency,
                budget: new.budget,
                remaining_budget: new.budget,
                price_per_submission: new.price_per_submission,
                status: new.status,
            };
            uow.put_campaign(campaign.clone());

            let transaction = LedgerTransaction::completed(
                advertiser_id,
                TransactionType::BudgetEscrow,
                -new.budget,
                currency,
                uow.now(),
            )
            .for_campaign(campaign_id);
            uow.append_transaction(transaction.clone());

            uow.emit(MarketEvent::BudgetEscrowed {
                advertiser_id,
                campaign_id,
                transaction_id: transaction.id,
                delta: new.budget,
                new_budget: new.budget,
                currency,
            });
            let event = audit(
                Some(advertiser_id),
                AuditAction::CreateCampaign,
                format!("campaign:{campaign_id}"),
                json!({ "campaign": null, "balance": before_balance }),
                json!({ "campaign": campaign, "balance": balance }),
                uow,
            );
            uow.emit(event);

            Ok(BudgetIncrease {
                campaign,
                delta: new.budget,
                transaction,
            })
        });

        let created = observe("create_campaign", result)?;
        ESCROWED_AMOUNT
            .with_label_values(&[created.campaign.currency.code()])
            .inc_by(created.delta.to_f64().unwrap_or_default());
        info!(
            advertiser = %advertiser_id,
            campaign = %campaign_id,
            budget = %created.delta,
            "Campaign created with escrowed budget"
        );
        Ok(created)
    }

    fn increase_campaign_budget(
        &self,
        advertiser_id: AccountId,
        campaign_id: CampaignId,
        new_budget_total: Amount,
    ) -> Result<BudgetIncrease, LedgerError> {
        let _timer = OperationTimer::start("increase_budget");

        let result = self.atomic(|uow| {
            if new_budget_total <= Amount::ZERO {
                return Err(LedgerError::invalid_amount(
                    new_budget_total,
                    "budget must be positive",
                ));
            }

            let campaign = uow.campaign(campaign_id)?;
            authorize(advertiser_id, &campaign, EntityKind::Campaign, campaign_id)?;
            if !campaign.status.accepts_budget_increase() {
                return Err(LedgerError::CampaignNotActive {
                    status: campaign.status,
                });
            }
            validate_amount(new_budget_total, campaign.currency, "budget")?;
            if new_budget_total <= campaign.budget {
                return Err(LedgerError::invalid_amount(
                    new_budget_total,
                    format!("must exceed the current budget of {}", campaign.budget),
                ));
            }

            let delta = new_budget_total - campaign.budget;
            let currency = campaign.currency;

            let (before_balance, balance) = escrow_funds(uow, advertiser_id, currency, delta)?;

            let updated = BudgetTracker::increase_budget(uow, campaign_id, delta)?;

            let transaction = LedgerTransaction::completed(
                advertiser_id,
                TransactionType::BudgetEscrow,
                -delta,
                currency,
                uow.now(),
            )
            .for_campaign(campaign_id);
            uow.append_transaction(transaction.clone());

            uow.emit(MarketEvent::BudgetEscrowed {
                advertiser_id,
                campaign_id,
                transaction_id: transaction.id,
                delta,
                new_budget: updated.budget,
                currency,
            });
            let event = audit(
                Some(advertiser_id),
                AuditAction::IncreaseCampaignBudget,
                format!("campaign:{campaign_id}"),
                json!({ "campaign": campaign, "balance": before_balance }),
                json!({ "campaign": updated, "balance": balance }),
                uow,
            );
            uow.emit(event);

            Ok(BudgetIncrease {
                campaign: updated,
                delta,
                transaction,
            })
        });

        let increase = observe("increase_budget", result)?;
        metric_inc!(BUDGET_INCREASES);
        ESCROWED_AMOUNT
            .with_label_values(&[increase.campaign.currency.code()])
            .inc_by(increase.delta.to_f64().unwrap_or_default());
        info!(
            advertiser = %advertiser_id,
            campaign = %campaign_id,
            delta = %increase.delta,
            budget = %increase.campaign.budget,
            "Campaign budget increased"
        );
        Ok(increase)
    }

    fn settle_approved_submission(
        &self,
        advertiser_id: AccountId,
        submission_id: SubmissionId,
    ) -> Result<Settlement, LedgerError> {
        let _timer = OperationTimer::start("settle");

        let result = self.atomic(|uow| {
            let before = uow.submission(submission_id)?;
            let campaign = uow.campaign(before.campaign_id)?;
            authorize(advertiser_id, &campaign, EntityKind::Submission, submission_id)?;
            review::ensure_pending(&before.status)?;
            if !campaign.status.accepts_settlement() {
                return Err(LedgerError::CampaignNotActive {
                    status: campaign.status,
                });
            }

            let price = campaign.price_per_submission;
            let updated = BudgetTracker::draw_down(uow, campaign.id, price)?;

            let mut submission = before.clone();
            submission.status = review::transition(
                &before.status,
                ReviewDecision::Approve {
                    amount_earned: price,
                },
            )?;
            submission.reviewed_at = Some(uow.now());
            uow.put_submission(submission.clone());

            let transaction = LedgerTransaction::completed(
                advertiser_id,
                TransactionType::SubmissionPayout,
                -price,
                campaign.currency,
                uow.now(),
            )
            .for_campaign(campaign.id)
            .for_submission(submission_id);
            uow.append_transaction(transaction.clone());

            uow.emit(MarketEvent::SubmissionSettled {
                advertiser_id,
                clipper_id: submission.clipper_id,
                campaign_id: campaign.id,
                submission_id,
                transaction_id: transaction.id,
                amount_earned: price,
                currency: campaign.currency,
            });
            let event = audit(
                Some(advertiser_id),
                AuditAction::SettleSubmission,
                format!("submission:{submission_id}"),
                json!({ "submission": before, "remaining_budget": campaign.remaining_budget }),
                json!({ "submission": submission, "remaining_budget": updated.remaining_budget }),
                uow,
            );
            uow.emit(event);

            Ok(Settlement {
                submission,
                amount_earned: price,
                transaction,
            })
        });

        let settlement = observe("settle", result)?;
        metric_inc!(SETTLEMENTS);
        info!(
            advertiser = %advertiser_id,
            submission = %submission_id,
            amount = %settlement.amount_earned,
            "Submission approved and settled"
        );
        Ok(settlement)
    }

    fn reject_submission(
        &self,
        advertiser_id: AccountId,
        submission_id: SubmissionId,
        reviewer_notes: &str,
    ) -> Result<Rejection, LedgerError> {
        let _timer = OperationTimer::start("reject");
        let min_len = self.config.min_reviewer_notes_len;

        let result = self.atomic(|uow| {
            let before = uow.submission(submission_id)?;
            let campaign = uow.campaign(before.campaign_id)?;
            authorize(advertiser_id, &campaign, EntityKind::Submission, submission_id)?;
            review::ensure_pending(&before.status)?;
            let notes = review::validate_reviewer_notes(reviewer_notes, min_len)?;

            let mut submission = before.clone();
            submission.status = review::transition(
                &before.status,
                ReviewDecision::Reject {
                    reviewer_notes: notes,
                },
            )?;
            submission.reviewed_at = Some(uow.now());
            uow.put_submission(submission.clone());

            uow.emit(MarketEvent::SubmissionRejected {
                advertiser_id,
                clipper_id: submission.clipper_id,
                campaign_id: campaign.id,
                submission_id,
            });
            let event = audit(
                Some(advertiser_id),
                AuditAction::RejectSubmission,
                format!("submission:{submission_id}"),
                json!({ "submission": before }),
                json!({ "submission": submission }),
                uow,
            );
            uow.emit(event);

            Ok(Rejection { submission })
        });

        let rejection = observe("reject", result)?;
        metric_inc!(REJECTIONS);
        info!(
            advertiser = %advertiser_id,
            submission = %submission_id,
            "Submission rejected"
        );
        Ok(rejection)
    }

    fn credit_clipper_payout(
        &self,
        submission_id: SubmissionId,
    ) -> Result<PayoutOutcome, LedgerError> {
        let _timer = OperationTimer::start("credit_payout");

        let result = self.atomic(|uow| {
            let submission = uow.submission(submission_id)?;
            let Some(amount) = submission.status.amount_earned() else {
                return Err(LedgerError::InvalidInput(format!(
                    "submission {submission_id} is {}; only approved submissions pay out",
                    submission.status.name()
                )));
            };

            if let Some(marker) = uow.payout_marker(submission_id) {
                return Ok(PayoutOutcome::AlreadyCredited {
                    transaction_id: marker.transaction_id,
                });
            }

            let campaign = uow.campaign(submission.campaign_id)?;
            let before = uow.ensure_balance(submission.clipper_id, campaign.currency);
            let mut balance = before.clone();
            balance.credit(amount)?;
            uow.put_balance(balance.clone());

            let transaction = LedgerTransaction::completed(
                submission.clipper_id,
                TransactionType::PayoutCredit,
                amount,
                campaign.currency,
                uow.now(),
            )
            .for_campaign(campaign.id)
            .for_submission(submission_id);
            uow.append_transaction(transaction.clone());

            uow.put_payout_marker(PayoutMarker {
                submission_id,
                clipper_id: submission.clipper_id,
                transaction_id: transaction.id,
                amount,
                credited_at: uow.now(),
            });

            uow.emit(MarketEvent::PayoutCredited {
                clipper_id: submission.clipper_id,
                campaign_id: campaign.id,
                submission_id,
                transaction_id: transaction.id,
                amount,
                currency: campaign.currency,
            });
            let event = audit(
                None,
                AuditAction::CreditPayout,
                format!("submission:{submission_id}"),
                json!({ "balance": before }),
                json!({ "balance": balance }),
                uow,
            );
            uow.emit(event);

            Ok(PayoutOutcome::Credited { transaction })
        });

        let outcome = observe("credit_payout", result)?;
        match &outcome {
            PayoutOutcome::Credited { transaction } => {
                metric_inc!(PAYOUTS_CREDITED);
                info!(
                    clipper = %transaction.account_id,
                    submission = %submission_id,
                    amount = %transaction.amount,
                    "Clipper payout credited"
                );
            }
            PayoutOutcome::AlreadyCredited { transaction_id } => {
                debug!(
                    submission = %submission_id,
                    transaction = %transaction_id,
                    "Payout already credited"
                );
            }
        }
        Ok(outcome)
    }

    fn reconcile_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<CampaignReconciliation, LedgerError> {
        let ledger = self
            .store
            .campaign_ledger(campaign_id)
            .ok_or_else(|| LedgerError::NotFound {
                entity: EntityKind::Campaign,
                id: campaign_id.to_string(),
            })?;

        let sum_of = |tx_type: TransactionType| -> Amount {
            ledger
                .transactions
                .iter()
                .filter(|tx| tx.tx_type == tx_type)
                .map(|tx| -tx.amount)
                .sum()
        };
        let settled_total = sum_of(TransactionType::SubmissionPayout);
        let escrowed_total = sum_of(TransactionType::BudgetEscrow);

        let approved: Vec<Amount> = ledger
            .submissions
            .iter()
            .filter_map(|s| s.status.amount_earned())
            .collect();
        let approved_total: Amount = approved.iter().copied().sum();

        let campaign = ledger.campaign;
        let drawn_down = campaign.spent();
        let consistent = drawn_down == settled_total && approved_total == settled_total;
        if !consistent {
            warn!(
                campaign = %campaign_id,
                drawn_down = %drawn_down,
                settled = %settled_total,
                approved = %approved_total,
                "Campaign budget trail does not reconcile"
            );
        }

        Ok(CampaignReconciliation {
            campaign_id,
            budget: campaign.budget,
            remaining_budget: campaign.remaining_budget,
            drawn_down,
            settled_total,
            approved_total,
            approved_count: approved.len(),
            escrowed_total,
            consistent,
        })
    }

    fn balance(&self, account_id: AccountId, currency: Currency) -> Result<Balance, LedgerError> {
        self.store.get_balance(account_id, currency)
    }

    fn ensure_balance(
        &self,
        account_id: AccountId,
        currency: Currency,
    ) -> Result<Balance, LedgerError> {
        observe(
            "ensure_balance",
            self.atomic(|uow| Ok(uow.ensure_balance(account_id, currency))),
        )
    }

    fn campaign(&self, campaign_id: CampaignId) -> Result<Campaign, LedgerError> {
        self.store.get_campaign(campaign_id)
    }

    fn submission(&self, submission_id: SubmissionId) -> Result<Submission, LedgerError> {
        self.store.get_submission(submission_id)
    }

    fn account_transactions(&self, account_id: AccountId) -> Vec<LedgerTransaction> {
        self.store.transactions_for_account(account_id)
    }

    fn campaign_transactions(&self, campaign_id: CampaignId) -> Vec<LedgerTransaction> {
        self.store.transactions_for_campaign(campaign_id)
    }

    fn campaign_submissions(&self, campaign_id: CampaignId) -> Vec<Submission> {
        self.store.submissions_for_campaign(campaign_id)
    }

    fn seed_balance(
        &self,
        account_id: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Balance, LedgerError> {
        validate_amount(amount, currency, "deposit")?;

        let balance = observe(
            "seed_balance",
            self.atomic(|uow| {
                let mut balance = uow.ensure_balance(account_id, currency);
                balance.credit(amount)?;
                uow.put_balance(balance.clone());
                Ok(balance)
            }),
        )?;
        debug!(account = %account_id, %currency, %amount, "Balance seeded");
        Ok(balance)
    }

    fn provision_campaign(&self, new: NewCampaign) -> Result<Campaign, LedgerError> {
        validate_amount(new.budget, new.currency, "budget")?;
        validate_amount(new.price_per_submission, new.currency, "price per submission")?;

        let campaign = Campaign {
            id: CampaignId::new(),
            advertiser_id: new.advertiser_id,
            currency: new.currency,
            budget: new.budget,
            remaining_budget: new.budget,
            price_per_submission: new.price_per_submission,
            status: new.status,
        };

        observe(
            "provision_campaign",
            self.atomic(|uow| {
                uow.put_campaign(campaign.clone());
                Ok(())
            }),
        )?;
        debug!(campaign = %campaign.id, budget = %campaign.budget, "Campaign provisioned");
        Ok(campaign)
    }

    fn provision_submission(
        &self,
        campaign_id: CampaignId,
        clipper_id: AccountId,
    ) -> Result<Submission, LedgerError> {
        let submission_id = SubmissionId::new();

        observe(
            "provision_submission",
            self.atomic(|uow| {
                let campaign = uow.campaign(campaign_id)?;
                if campaign.status != CampaignStatus::Active {
                    return Err(LedgerError::CampaignNotActive {
                        status: campaign.status,
                    });
                }
                let submission = Submission {
                    id: submission_id,
                    campaign_id,
                    clipper_id,
                    status: SubmissionStatus::Pending,
                    submitted_at: uow.now(),
                    reviewed_at: None,
                };
                uow.put_submission(submission.clone());
                Ok(submission)
            }),
        )
    }

    fn set_campaign_status(
        &self,
        campaign_id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Campaign, LedgerError> {
        observe(
            "set_campaign_status",
            self.atomic(|uow| {
                let mut campaign = uow.campaign(campaign_id)?;
                if campaign.status == CampaignStatus::Completed && status != CampaignStatus::Completed
                {
                    return Err(LedgerError::CampaignNotActive {
                        status: campaign.status,
                    });
                }
                campaign.status = status;
                uow.put_campaign(campaign.clone());
                Ok(campaign)
            }),
        )
    }
}
