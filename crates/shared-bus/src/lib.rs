//! # Shared Bus - Event Bus for Ledger Consumers
//!
//! Carries events produced by committed ledger mutations to the consumers
//! that react to them: notifications, audit sinks and the payout worker.
//!
//! ## Delivery Path
//!
//! ```text
//! ┌──────────────┐  commit   ┌──────────────┐  relay   ┌──────────────┐
//! │ Escrow       │ ────────→ │ Outbox       │ ───────→ │  Event Bus   │
//! │ Engine       │ (atomic)  │ (in store)   │ publish  │              │
//! └──────────────┘           └──────────────┘          └──────┬───────┘
//!                                                             │ subscribe()
//!                                            ┌────────────────┼────────────┐
//!                                            ▼                ▼            ▼
//!                                      Notifications       Audit        Payout
//! ```
//!
//! ## Guarantees
//!
//! - **Commit before publish:** nothing reaches the bus unless the mutation
//!   that produced it committed
//! - **Lossless fan-out:** every subscription has its own queue; a slow
//!   consumer falls behind but never misses an event
//! - **At least once:** consumers track what they handled and skip
//!   redeliveries after a relay restart
//! - **Drain on close:** `close()` lets subscriptions finish their queues
//! - **Dead Letter Queue:** consumer failures are republished as `CriticalError`

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{
    AuditAction, AuditRecord, EventEnvelope, EventFilter, EventTopic, MarketEvent, UNSEQUENCED,
};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::Subscription;
