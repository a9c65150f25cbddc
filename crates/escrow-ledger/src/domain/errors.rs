//! Escrow ledger error types.
//!
//! Every failure leaves the store exactly as it was before the call. Each
//! variant maps to a stable [`ErrorKind`] for callers that branch on the
//! category and for metric labels.

use super::entities::CampaignStatus;
use shared_types::{AccountId, Amount, Currency};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Balance,
    Campaign,
    Submission,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Balance => "balance",
            Self::Campaign => "campaign",
            Self::Submission => "submission",
        };
        f.write_str(name)
    }
}

/// Escrow ledger error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Amount is not positive, not above the current budget, or has more
    /// decimal places than the currency allows.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Amount, reason: String },

    /// Advertiser's available balance cannot cover the escrow.
    #[error(
        "Insufficient funds: available {available} {currency}, required {required}, short by {shortfall}"
    )]
    InsufficientFunds {
        available: Amount,
        required: Amount,
        shortfall: Amount,
        currency: Currency,
    },

    /// Campaign pool cannot cover the per-submission price.
    #[error("Insufficient campaign budget: remaining {remaining}, required {required}")]
    InsufficientBudget { remaining: Amount, required: Amount },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },

    /// Caller does not own the record.
    #[error("Account {actor} may not act on {entity} {id}")]
    Forbidden {
        actor: AccountId,
        entity: EntityKind,
        id: String,
    },

    /// Submission has left PENDING.
    #[error("Submission already reviewed (status {status})")]
    AlreadyReviewed { status: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Campaign status forbids the operation.
    #[error("Campaign is {status}")]
    CampaignNotActive { status: CampaignStatus },

    /// A row read by the unit of work changed before commit.
    #[error("Concurrent modification of {0}")]
    Conflict(String),

    /// Commit lock not acquired in time.
    #[error("Timed out after {0:?} waiting for the commit lock")]
    Timeout(Duration),

    /// Journal failure. Nothing was applied.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// A staged write would break a ledger invariant. Nothing was applied.
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
}

/// Stable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientFunds,
    InsufficientBudget,
    NotFound,
    Forbidden,
    AlreadyReviewed,
    InvalidInput,
    CampaignNotActive,
    Conflict,
    Timeout,
    Storage,
    InvariantViolation,
}

impl ErrorKind {
    /// Snake-case label, used in metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidAmount => "invalid_amount",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InsufficientBudget => "insufficient_budget",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::AlreadyReviewed => "already_reviewed",
            Self::InvalidInput => "invalid_input",
            Self::CampaignNotActive => "campaign_not_active",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::Storage => "storage",
            Self::InvariantViolation => "invariant_violation",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Conflict | Self::Timeout | Self::Storage)
    }
}

impl LedgerError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientBudget { .. } => ErrorKind::InsufficientBudget,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::AlreadyReviewed { .. } => ErrorKind::AlreadyReviewed,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::CampaignNotActive { .. } => ErrorKind::CampaignNotActive,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Storage(_) => ErrorKind::Storage,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_amount(amount: Amount, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            amount,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_message_carries_shortfall() {
        let err = LedgerError::InsufficientFunds {
            available: dec!(100),
            required: dec!(150),
            shortfall: dec!(50),
            currency: Currency::USD,
        };
        let msg = err.to_string();
        assert!(msg.contains("short by 50"));
        assert!(msg.contains("USD"));
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn test_kind_labels_are_unique() {
        let kinds = [
            ErrorKind::InvalidAmount,
            ErrorKind::InsufficientFunds,
            ErrorKind::InsufficientBudget,
            ErrorKind::NotFound,
            ErrorKind::Forbidden,
            ErrorKind::AlreadyReviewed,
            ErrorKind::InvalidInput,
            ErrorKind::CampaignNotActive,
            ErrorKind::Conflict,
            ErrorKind::Timeout,
            ErrorKind::Storage,
            ErrorKind::InvariantViolation,
        ];
        let labels: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(labels.len(), kinds.len());
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::Conflict.is_transient());
        assert!(!ErrorKind::InsufficientBudget.is_transient());
    }
}
