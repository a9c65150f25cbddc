//! # Submission Review State Machine
//!
//! ```text
//!            approve(amount)
//! [PENDING] ────────────────→ [APPROVED]   (terminal)
//!     │
//!     └──── reject(notes) ──→ [REJECTED]   (terminal)
//! ```
//!
//! | From | Decision | To |
//! |------|----------|----|
//! | PENDING | Approve | APPROVED |
//! | PENDING | Reject | REJECTED |
//! | APPROVED | any | `AlreadyReviewed` |
//! | REJECTED | any | `AlreadyReviewed` |

use super::entities::SubmissionStatus;
use super::errors::LedgerError;
use shared_types::Amount;

/// Reviewer decision on a pending submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve { amount_earned: Amount },
    Reject { reviewer_notes: String },
}

/// Apply `decision` to `current`.
pub fn transition(
    current: &SubmissionStatus,
    decision: ReviewDecision,
) -> Result<SubmissionStatus, LedgerError> {
    match (current, decision) {
        (SubmissionStatus::Pending, ReviewDecision::Approve { amount_earned }) => {
            Ok(SubmissionStatus::Approved { amount_earned })
        }
        (SubmissionStatus::Pending, ReviewDecision::Reject { reviewer_notes }) => {
            Ok(SubmissionStatus::Rejected { reviewer_notes })
        }
        (SubmissionStatus::Approved { .. } | SubmissionStatus::Rejected { .. }, _) => {
            Err(LedgerError::AlreadyReviewed {
                status: current.name(),
            })
        }
    }
}

/// Fail with `AlreadyReviewed` unless the submission is still pending.
pub fn ensure_pending(current: &SubmissionStatus) -> Result<(), LedgerError> {
    if current.is_terminal() {
        return Err(LedgerError::AlreadyReviewed {
            status: current.name(),
        });
    }
    Ok(())
}

/// Trim reviewer notes and require at least `min_len` characters.
pub fn validate_reviewer_notes(notes: &str, min_len: usize) -> Result<String, LedgerError> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput(
            "reviewer notes are required to reject a submission".to_string(),
        ));
    }
    let len = trimmed.chars().count();
    if len < min_len {
        return Err(LedgerError::InvalidInput(format!(
            "reviewer notes must be at least {min_len} characters, got {len}"
        )));
    }
    Ok(trimmed.to_string())
}
