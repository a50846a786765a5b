//! Coordinates volatile memory and journal persistence for one agent's
//! session history.

use std::sync::Arc;

use crate::journal::Journal;
use crate::record::MemoryRecord;
use crate::volatile::{VolatileConfig, VolatileMemory, VolatileStats};
use crate::{MemoryError, MemoryResult};

/// Builder for [`MemoryBus`] instances.
pub struct MemoryBusBuilder {
    volatile_config: VolatileConfig,
    journal: Option<Arc<dyn Journal>>,
}

impl MemoryBusBuilder {
    /// Starts a new builder using the supplied volatile config.
    #[must_use]
    pub fn new(volatile_config: VolatileConfig) -> Self {
        Self {
            volatile_config,
            journal: None,
        }
    }

    /// Installs the journal implementation. This is required before calling [`build`](Self::build).
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Builds the [`MemoryBus`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::MissingJournal`] when no journal was provided.
    pub fn build(self) -> MemoryResult<MemoryBus> {
        let journal = self.journal.ok_or(MemoryError::MissingJournal)?;
        Ok(MemoryBus {
            volatile: Arc::new(VolatileMemory::new(self.volatile_config)),
            journal,
        })
    }
}

/// Central memory facade held by each `AgentInstance`: a bounded ring of
/// recent turns (cheap, `memory_window`-sized recall) backed by a durable
/// journal that survives process restarts.
#[derive(Clone)]
pub struct MemoryBus {
    volatile: Arc<VolatileMemory>,
    journal: Arc<dyn Journal>,
}

impl MemoryBus {
    /// Creates a builder for a memory bus.
    #[must_use]
    pub fn builder(config: VolatileConfig) -> MemoryBusBuilder {
        MemoryBusBuilder::new(config)
    }

    /// Returns the underlying volatile store.
    #[must_use]
    pub fn volatile(&self) -> &Arc<VolatileMemory> {
        &self.volatile
    }

    /// Returns the configured journal.
    #[must_use]
    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.journal
    }

    /// Persists a record to both the volatile window and the durable journal.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] when writing to the journal fails.
    pub async fn record(&self, record: MemoryRecord) -> MemoryResult<()> {
        self.volatile.push(record.clone()).await;
        self.journal.append(&record).await?;
        Ok(())
    }

    /// Returns recent records from volatile memory.
    #[must_use]
    pub async fn recent(&self, limit: usize) -> Vec<MemoryRecord> {
        self.volatile.recent(limit).await
    }

    /// Reads the tail of the journal.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] when reading or decoding entries from the
    /// journal fails.
    pub async fn journal_tail(&self, limit: usize) -> MemoryResult<Vec<MemoryRecord>> {
        self.journal.tail(limit).await
    }

    /// Returns utilisation statistics for the volatile store.
    #[must_use]
    pub async fn stats(&self) -> VolatileStats {
        self.volatile.stats().await
    }
}
