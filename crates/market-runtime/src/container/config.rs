//! # Runtime Configuration
//!
//! Unified configuration for the ledger, its storage and the outbox relay.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `MKT_MAX_CONFLICT_RETRIES` | `ledger.max_conflict_retries` |
//! | `MKT_RETRY_BACKOFF_MS` | `ledger.retry_backoff_ms` |
//! | `MKT_MIN_REVIEWER_NOTES` | `ledger.min_reviewer_notes_len` |
//! | `MKT_LOCK_TIMEOUT_MS` | `ledger.lock_timeout_ms` |
//! | `MKT_DATA_DIR` | `storage.data_dir` |
//! | `MKT_DURABLE` | `storage.durable` |
//! | `MKT_RELAY_BATCH` | `relay.batch_size` |
//! | `MKT_RELAY_POLL_MS` | `relay.poll_interval_ms` |
//! | `MKT_SHUTDOWN_GRACE_SECS` | `shutdown_grace_secs` |

use escrow_ledger::{EngineConfig, RelayConfig, StoreConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub relay: RelaySettings,
    /// How long shutdown waits for consumers to finish.
    pub shutdown_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            storage: StorageConfig::default(),
            relay: RelaySettings::default(),
            shutdown_grace_secs: 5,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// Durable storage requested but the binary was built without RocksDB.
    #[error("MKT_DURABLE is set but this build lacks the `rocksdb` feature")]
    DurableStorageUnavailable,
}

impl RuntimeConfig {
    /// Reject values the runtime cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(())
            }
        };

        positive("ledger.lock_timeout_ms", self.ledger.lock_timeout_ms)?;
        positive(
            "ledger.min_reviewer_notes_len",
            self.ledger.min_reviewer_notes_len as u64,
        )?;
        positive("relay.batch_size", self.relay.batch_size as u64)?;
        positive("relay.poll_interval_ms", self.relay.poll_interval_ms)?;

        if self.storage.durable && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::DurableStorageUnavailable);
        }
        Ok(())
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_conflict_retries: self.ledger.max_conflict_retries,
            retry_backoff: Duration::from_millis(self.ledger.retry_backoff_ms),
            min_reviewer_notes_len: self.ledger.min_reviewer_notes_len,
        }
    }

    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            lock_timeout: Duration::from_millis(self.ledger.lock_timeout_ms),
        }
    }

    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            batch_size: self.relay.batch_size,
            poll_interval: Duration::from_millis(self.relay.poll_interval_ms),
        }
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Escrow engine and store tuning.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub max_conflict_retries: u32,
    pub retry_backoff_ms: u64,
    pub min_reviewer_notes_len: usize,
    /// Commit lock wait before a unit fails with `Timeout`.
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            retry_backoff_ms: 5,
            min_reviewer_notes_len: 10,
            lock_timeout_ms: 2_000,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Journal directory when `durable` is set.
    pub data_dir: PathBuf,
    /// Journal every commit to RocksDB.
    pub durable: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            durable: false,
        }
    }
}

/// Outbox relay configuration.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_interval_ms: 250,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Ignoring unparsable environment flag");
            None
        }
    }
}

/// Load configuration: defaults, then `MKT_*` environment overrides.
#[must_use]
pub fn load_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();

    if let Some(v) = env_parse("MKT_MAX_CONFLICT_RETRIES") {
        config.ledger.max_conflict_retries = v;
    }
    if let Some(v) = env_parse("MKT_RETRY_BACKOFF_MS") {
        config.ledger.retry_backoff_ms = v;
    }
    if let Some(v) = env_parse("MKT_MIN_REVIEWER_NOTES") {
        config.ledger.min_reviewer_notes_len = v;
    }
    if let Some(v) = env_parse("MKT_LOCK_TIMEOUT_MS") {
        config.ledger.lock_timeout_ms = v;
    }
    if let Ok(dir) = std::env::var("MKT_DATA_DIR") {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(v) = env_flag("MKT_DURABLE") {
        config.storage.durable = v;
    }
    if let Some(v) = env_parse("MKT_RELAY_BATCH") {
        config.relay.batch_size = v;
    }
    if let Some(v) = env_parse("MKT_RELAY_POLL_MS") {
        config.relay.poll_interval_ms = v;
    }
    if let Some(v) = env_parse("MKT_SHUTDOWN_GRACE_SECS") {
        config.shutdown_grace_secs = v;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.ledger.max_conflict_retries, 5);
        assert_eq!(config.ledger.min_reviewer_notes_len, 10);
        assert!(!config.storage.durable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = RuntimeConfig::default();
        config.relay.batch_size = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "relay.batch_size",
                reason: "must be greater than zero".to_string(),
            })
        );

        let mut config = RuntimeConfig::default();
        config.ledger.lock_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[cfg(not(feature = "rocksdb"))]
    #[test]
    fn test_durable_needs_rocksdb_feature() {
        let mut config = RuntimeConfig::default();
        config.storage.durable = true;
        assert_eq!(config.validate(), Err(ConfigError::DurableStorageUnavailable));
    }

    #[test]
    fn test_derived_configs() {
        let mut config = RuntimeConfig::default();
        config.ledger.retry_backoff_ms = 7;
        config.ledger.lock_timeout_ms = 300;
        config.relay.poll_interval_ms = 40;

        assert_eq!(config.engine_config().retry_backoff, Duration::from_millis(7));
        assert_eq!(config.store_config().lock_timeout, Duration::from_millis(300));
        assert_eq!(config.relay_config().poll_interval, Duration::from_millis(40));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("MKT_RELAY_BATCH", "64");
        std::env::set_var("MKT_MIN_REVIEWER_NOTES", "not-a-number");
        let config = load_config();
        std::env::remove_var("MKT_RELAY_BATCH");
        std::env::remove_var("MKT_MIN_REVIEWER_NOTES");

        assert_eq!(config.relay.batch_size, 64);
        assert_eq!(config.ledger.min_reviewer_notes_len, 10);
    }
}
