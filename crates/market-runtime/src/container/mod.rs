//! # Service Container
//!
//! Holds the ledger store, the escrow engine and the event bus with their
//! wiring done once at startup.
//!
//! - The engine notifies the relay signal after every event-bearing commit
//! - Consumers only see events through the bus, never through the engine

pub mod config;
pub mod services;

pub use config::{load_config, ConfigError, RuntimeConfig};
pub use services::ServiceContainer;
