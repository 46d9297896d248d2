//! Storage backend selection.

use std::sync::Arc;

use crate::filesystem::{FilesystemIndexStore, FilesystemLedger};
use crate::memory::{MemoryIndexStore, MemoryLedger};
use crate::store::{FilterIndexStore, ItemLedger};

/// Where the bookkeeping lives.
///
/// `Memory` keeps everything process-local; `Filesystem` persists under the
/// given directory, shared by the ledger and the index store.
#[derive(Debug, Clone, Default)]
pub enum StorageConfig {
    #[default]
    Memory,
    Filesystem {
        dir: String,
    },
}

impl StorageConfig {
    pub fn filesystem(dir: impl Into<String>) -> Self {
        Self::Filesystem { dir: dir.into() }
    }

    /// Build the item ledger for this configuration.
    pub fn build_item_ledger(&self) -> Arc<dyn ItemLedger> {
        match self {
            Self::Memory => Arc::new(MemoryLedger::new()),
            Self::Filesystem { dir } => Arc::new(FilesystemLedger::new(dir.clone())),
        }
    }

    /// Build the filter index store for this configuration.
    pub fn build_index_store(&self) -> Arc<dyn FilterIndexStore> {
        match self {
            Self::Memory => Arc::new(MemoryIndexStore::new()),
            Self::Filesystem { dir } => Arc::new(FilesystemIndexStore::new(dir.clone())),
        }
    }
}
