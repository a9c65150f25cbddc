//! # Market Runtime Library
//!
//! Wires the escrow engine to its post-commit consumers. The binary in
//! `main.rs` loads configuration, initialises telemetry and runs a
//! [`MarketRuntime`] until Ctrl+C.
//!
//! ## Event Flow
//!
//! ```text
//! EscrowEngine ──commit──► outbox ──OutboxRelay──► InMemoryEventBus
//!                                                       │
//!               ┌───────────────────────┬───────────────┴──────────┐
//!               ▼                       ▼                          ▼
//!      NotificationHandler        AuditHandler               PayoutHandler
//!               │                       │                          │
//!               ▼                       ▼                          ▼
//!       NotificationSink            AuditSink        credit_clipper_payout
//!                                                   (dead letter on failure)
//! ```
//!
//! Every handler advances its own durable cursor after handling an event;
//! the store drops an outbox entry once all three cursors have passed it.

pub mod container;
pub mod handlers;
pub mod runtime;

pub use container::{load_config, ConfigError, RuntimeConfig, ServiceContainer};
pub use runtime::{MarketRuntime, Sinks};
