//! # Consumer Cursor
//!
//! A bus consumer's durable position in the outbox. The consumer advances
//! it after handling events; the store prunes an entry once every cursor
//! has moved past it.
//!
//! After a relay restart retained entries are published again from the
//! oldest one, so consumers check [`ConsumerCursor::is_handled`] first.

use crate::domain::errors::LedgerError;
use crate::ports::outbound::ConsumerOffsets;
use shared_bus::UNSEQUENCED;
use std::sync::Arc;
use tracing::debug;

pub struct ConsumerCursor {
    name: String,
    offsets: Arc<dyn ConsumerOffsets>,
    next: u64,
}

impl ConsumerCursor {
    /// Register `name` with the store, resuming its stored offset.
    pub fn register(
        offsets: Arc<dyn ConsumerOffsets>,
        name: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        let name = name.into();
        let next = offsets.register_consumer(&name)?;
        Ok(Self { name, offsets, next })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next sequence this consumer has not handled.
    #[must_use]
    pub fn next(&self) -> u64 {
        self.next
    }

    /// Dead letters carry no sequence and are never treated as handled.
    #[must_use]
    pub fn is_handled(&self, sequence: u64) -> bool {
        sequence != UNSEQUENCED && sequence < self.next
    }

    /// Acknowledge everything up to and including `through`.
    ///
    /// Returns how many outbox entries the store pruned.
    pub async fn advance(&mut self, through: Option<u64>) -> Result<usize, LedgerError> {
        let Some(through) = through else {
            return Ok(0);
        };
        if through == UNSEQUENCED || through < self.next {
            return Ok(0);
        }

        let offsets = Arc::clone(&self.offsets);
        let name = self.name.clone();
        let pruned = tokio::task::spawn_blocking(move || offsets.acknowledge(&name, through))
            .await
            .map_err(|e| LedgerError::Storage(format!("acknowledge task failed: {e}")))??;

        self.next = through + 1;
        debug!(consumer = %self.name, next = self.next, pruned, "Cursor advanced");
        Ok(pruned)
    }
}
