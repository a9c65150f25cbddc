//! # Clip Market Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scenarios.rs     # End-to-end ledger scenarios through the public API
//!     ├── concurrency.rs   # Racing units of work against shared rows
//!     └── choreography.rs  # Outbox → bus → consumers
//! tests/benches/
//! └── ledger_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p market-tests
//! cargo test -p market-tests integration::concurrency::
//! cargo bench -p market-tests
//! ```

pub mod integration;
