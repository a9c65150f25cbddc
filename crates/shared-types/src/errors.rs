//! # Error Types
//!
//! Parsing errors for the shared value types.

use thiserror::Error;

/// Errors raised while constructing shared value types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    /// Currency code is not three uppercase ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Identifier is not a valid UUID.
    #[error("Invalid {kind} identifier: {value:?}")]
    InvalidId { kind: &'static str, value: String },
}
