//! In-memory storage backends.
//!
//! Process-local implementations of the bookkeeping traits, used by tests
//! and by embeddings that do not need durability across restarts. Writes
//! are serialized through interior locks so concurrently running passes on
//! different filters can share one instance.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::index::FilterIndex;
use crate::item::{ReplicationItem, Status};
use crate::store::{FilterIndexStore, ItemLedger};

/// In-memory append-only item ledger.
#[derive(Default)]
pub struct MemoryLedger {
    items: RwLock<Vec<ReplicationItem>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The latest entry wins by `done_time`; equal stamps resolve to the entry
/// appended last.
fn latest<'a>(
    entries: impl Iterator<Item = &'a ReplicationItem>,
) -> Option<&'a ReplicationItem> {
    entries.fold(None, |best: Option<&ReplicationItem>, item| match best {
        Some(b) if item.done_time < b.done_time => Some(b),
        _ => Some(item),
    })
}

#[async_trait]
impl ItemLedger for MemoryLedger {
    async fn get_latest(&self, filter_id: &str, metadata_id: &str) -> Option<ReplicationItem> {
        let items = self.items.read().expect("ledger lock poisoned");
        latest(
            items
                .iter()
                .filter(|i| i.filter_id == filter_id && i.metadata_id == metadata_id),
        )
        .cloned()
    }

    async fn failure_list(&self, filter_id: &str) -> Result<Vec<String>, PersistenceError> {
        let items = self.items.read().expect("ledger lock poisoned");
        Ok(failure_ids(items.iter().filter(|i| i.filter_id == filter_id)))
    }

    async fn save(&self, item: &ReplicationItem) -> Result<(), PersistenceError> {
        let mut items = self.items.write().expect("ledger lock poisoned");
        items.push(item.clone());
        Ok(())
    }

    async fn all_for_filter(
        &self,
        filter_id: &str,
        start_index: usize,
        page_size: usize,
    ) -> Result<Vec<ReplicationItem>, PersistenceError> {
        let items = self.items.read().expect("ledger lock poisoned");
        Ok(items
            .iter()
            .filter(|i| i.filter_id == filter_id)
            .skip(start_index)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn remove_all_for_filter(&self, filter_id: &str) -> Result<(), PersistenceError> {
        let mut items = self.items.write().expect("ledger lock poisoned");
        items.retain(|i| i.filter_id != filter_id);
        Ok(())
    }
}

/// Ids whose latest entry is not a success, deduplicated.
pub(crate) fn failure_ids<'a>(entries: impl Iterator<Item = &'a ReplicationItem>) -> Vec<String> {
    let mut latest_per_record: HashMap<&str, &ReplicationItem> = HashMap::new();
    for item in entries {
        match latest_per_record.get(item.metadata_id.as_str()) {
            Some(best) if item.done_time < best.done_time => {}
            _ => {
                latest_per_record.insert(item.metadata_id.as_str(), item);
            }
        }
    }
    latest_per_record
        .into_values()
        .filter(|i| i.status != Status::Success)
        .map(|i| i.metadata_id.clone())
        .collect()
}

/// In-memory filter index store.
#[derive(Default)]
pub struct MemoryIndexStore {
    indexes: RwLock<HashMap<String, FilterIndex>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilterIndexStore for MemoryIndexStore {
    async fn get_or_create(&self, filter_id: &str) -> Result<FilterIndex, PersistenceError> {
        let indexes = self.indexes.read().expect("index lock poisoned");
        Ok(indexes
            .get(filter_id)
            .cloned()
            .unwrap_or_else(|| FilterIndex::new(filter_id)))
    }

    async fn save(&self, index: &FilterIndex) -> Result<(), PersistenceError> {
        let mut indexes = self.indexes.write().expect("index lock poisoned");
        indexes.insert(index.id.clone(), index.clone());
        Ok(())
    }
}
