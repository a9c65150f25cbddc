//! # RocksDB Journal
//!
//! Durable [`Journal`] for the in-memory store. Every commit is one
//! `WriteBatch`, so a crash leaves either all of a unit's rows on disk or
//! none of them.
//!
//! ## Column Families
//!
//! | Family | Key | Value |
//! |--------|-----|-------|
//! | `balances` | `<account>:<currency>` | versioned balance |
//! | `campaigns` | campaign id | versioned campaign |
//! | `submissions` | submission id | versioned submission |
//! | `payouts` | submission id | versioned payout marker |
//! | `transactions` | append position, big-endian | transaction |
//! | `outbox` | sequence, big-endian | event envelope |
//! | `consumers` | consumer name | next sequence, big-endian u64 |
//! | `meta` | `next_sequence` | big-endian u64 |
//!
//! Values are JSON so that journals stay readable with stock tooling.

use crate::domain::errors::LedgerError;
use crate::ports::outbound::{Journal, JournalBatch};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DBCompressionType,
    IteratorMode, Options, WriteBatch, WriteOptions, DB,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

pub const CF_BALANCES: &str = "balances";
pub const CF_CAMPAIGNS: &str = "campaigns";
pub const CF_SUBMISSIONS: &str = "submissions";
pub const CF_PAYOUTS: &str = "payouts";
pub const CF_TRANSACTIONS: &str = "transactions";
pub const CF_OUTBOX: &str = "outbox";
pub const CF_CONSUMERS: &str = "consumers";
pub const CF_META: &str = "meta";

pub const COLUMN_FAMILIES: &[&str] = &[
    CF_BALANCES,
    CF_CAMPAIGNS,
    CF_SUBMISSIONS,
    CF_PAYOUTS,
    CF_TRANSACTIONS,
    CF_OUTBOX,
    CF_CONSUMERS,
    CF_META,
];

const NEXT_SEQUENCE_KEY: &[u8] = b"next_sequence";

/// RocksDB configuration
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: String,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// fsync every commit (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/ledger".to_string(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Small buffers, no fsync.
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed journal.
pub struct RocksDbJournal {
    db: DB,
    config: RocksDbConfig,
}

fn storage_error(context: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("{context}: {e}"))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LedgerError> {
    serde_json::to_vec(value).map_err(|e| storage_error("encode", e))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| storage_error("decode", e))
}

fn decode_u64(bytes: &[u8]) -> Result<u64, LedgerError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LedgerError::Storage(format!("expected 8-byte key, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

impl RocksDbJournal {
    /// Open or create the journal at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, LedgerError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, descriptors)
            .map_err(|e| storage_error("failed to open RocksDB", e))?;

        info!(path = %config.path, "Ledger journal opened");
        Ok(Self { db, config })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, LedgerError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("missing column family {name}")))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    fn values<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, LedgerError> {
        let cf = self.cf(name)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(|e| storage_error("iterate", e))?;
                decode(&value)
            })
            .collect()
    }

    fn positioned<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<(u64, T)>, LedgerError> {
        let cf = self.cf(name)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (key, value) = item.map_err(|e| storage_error("iterate", e))?;
                Ok((decode_u64(&key)?, decode(&value)?))
            })
            .collect()
    }

    fn offsets(&self) -> Result<Vec<(String, u64)>, LedgerError> {
        let cf = self.cf(CF_CONSUMERS)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (key, value) = item.map_err(|e| storage_error("iterate", e))?;
                let name = String::from_utf8(key.to_vec())
                    .map_err(|e| storage_error("consumer name", e))?;
                Ok((name, decode_u64(&value)?))
            })
            .collect()
    }
}

impl Journal for RocksDbJournal {
    fn persist(&self, batch: &JournalBatch) -> Result<(), LedgerError> {
        let mut write = WriteBatch::default();

        let cf = self.cf(CF_BALANCES)?;
        for row in &batch.balances {
            let key = format!("{}:{}", row.row.account_id, row.row.currency);
            write.put_cf(cf, key.as_bytes(), encode(row)?);
        }
        let cf = self.cf(CF_CAMPAIGNS)?;
        for row in &batch.campaigns {
            write.put_cf(cf, row.row.id.to_string().as_bytes(), encode(row)?);
        }
        let cf = self.cf(CF_SUBMISSIONS)?;
        for row in &batch.submissions {
            write.put_cf(cf, row.row.id.to_string().as_bytes(), encode(row)?);
        }
        let cf = self.cf(CF_PAYOUTS)?;
        for row in &batch.payout_markers {
            write.put_cf(cf, row.row.submission_id.to_string().as_bytes(), encode(row)?);
        }
        let cf = self.cf(CF_TRANSACTIONS)?;
        for (position, tx) in &batch.transactions {
            write.put_cf(cf, position.to_be_bytes(), encode(tx)?);
        }
        let cf = self.cf(CF_OUTBOX)?;
        for envelope in &batch.outbox {
            write.put_cf(cf, envelope.sequence.to_be_bytes(), encode(envelope)?);
        }
        write.put_cf(
            self.cf(CF_META)?,
            NEXT_SEQUENCE_KEY,
            batch.next_sequence.to_be_bytes(),
        );

        self.db
            .write_opt(write, &self.write_options())
            .map_err(|e| storage_error("journal write failed", e))
    }

    fn record_offset(&self, consumer: &str, next: u64, pruned: &[u64]) -> Result<(), LedgerError> {
        let mut write = WriteBatch::default();
        write.put_cf(self.cf(CF_CONSUMERS)?, consumer.as_bytes(), next.to_be_bytes());
        let cf = self.cf(CF_OUTBOX)?;
        for sequence in pruned {
            write.delete_cf(cf, sequence.to_be_bytes());
        }
        self.db
            .write_opt(write, &self.write_options())
            .map_err(|e| storage_error("consumer offset write failed", e))
    }

    fn load(&self) -> Result<JournalBatch, LedgerError> {
        let next_sequence = self
            .db
            .get_cf(self.cf(CF_META)?, NEXT_SEQUENCE_KEY)
            .map_err(|e| storage_error("read meta", e))?
            .map(|bytes| decode_u64(&bytes))
            .transpose()?
            .unwrap_or(0);

        Ok(JournalBatch {
            balances: self.values(CF_BALANCES)?,
            campaigns: self.values(CF_CAMPAIGNS)?,
            submissions: self.values(CF_SUBMISSIONS)?,
            payout_markers: self.values(CF_PAYOUTS)?,
            transactions: self.positioned(CF_TRANSACTIONS)?,
            outbox: self
                .positioned(CF_OUTBOX)?
                .into_iter()
                .map(|(_, envelope)| envelope)
                .collect(),
            next_sequence,
            consumer_offsets: self.offsets()?,
        })
    }
}
