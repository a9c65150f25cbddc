//! Domain layer for the escrow ledger.
//!
//! Contains the rows, error taxonomy, unit of work, budget arithmetic and
//! the review state machine. No I/O.

pub mod budget;
pub mod entities;
pub mod errors;
pub mod review;
pub mod unit_of_work;
pub mod value_objects;

pub use budget::BudgetTracker;
pub use entities::*;
pub use errors::*;
pub use review::{validate_reviewer_notes, ReviewDecision};
pub use unit_of_work::{run_atomic, ChangeSet, CommitReceipt, RetryPolicy, RowKey, UnitOfWork, Versioned};
pub use value_objects::*;
