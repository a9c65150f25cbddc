//! # Shared Types Crate
//!
//! Identifier newtypes, the funding currency and the money representation
//! used by every crate in the workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-crate types are defined here only.
//! - **No raw UUIDs across boundaries**: an advertiser id can never be passed
//!   where a campaign id is expected.
//! - **Decimal money**: amounts are `rust_decimal::Decimal`, never floats.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
