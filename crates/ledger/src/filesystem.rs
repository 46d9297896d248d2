//! Filesystem storage backends.
//!
//! Ledger entries for a filter live in one append-only JSON-lines file;
//! each filter index is a single JSON document. Both are written under a
//! configured directory, created on first write. Reads of a missing file
//! mean "no history yet", never an error.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::index::{FilterIndex, FilterIndexRecord};
use crate::item::ReplicationItem;
use crate::memory::failure_ids;
use crate::store::{FilterIndexStore, ItemLedger};

/// Filesystem-backed item ledger.
pub struct FilesystemLedger {
    dir: PathBuf,
}

impl FilesystemLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn items_path(&self, filter_id: &str) -> PathBuf {
        self.dir.join(format!("items_{filter_id}.jsonl"))
    }

    fn load_all(&self, filter_id: &str) -> Result<Vec<ReplicationItem>, PersistenceError> {
        let path = self.items_path(filter_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        let mut items = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            items.push(serde_json::from_str(line)?);
        }
        Ok(items)
    }
}

#[async_trait]
impl ItemLedger for FilesystemLedger {
    async fn get_latest(&self, filter_id: &str, metadata_id: &str) -> Option<ReplicationItem> {
        let items = match self.load_all(filter_id) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(
                    "failed to read ledger for filter {filter_id}, treating history as unknown: {e}"
                );
                return None;
            }
        };
        items
            .into_iter()
            .filter(|i| i.metadata_id == metadata_id)
            .fold(None, |best: Option<ReplicationItem>, item| match best {
                Some(b) if item.done_time < b.done_time => Some(b),
                _ => Some(item),
            })
    }

    async fn failure_list(&self, filter_id: &str) -> Result<Vec<String>, PersistenceError> {
        let items = self.load_all(filter_id)?;
        Ok(failure_ids(items.iter()))
    }

    async fn save(&self, item: &ReplicationItem) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.items_path(&item.filter_id))?;
        let mut line = serde_json::to_string(item)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    async fn all_for_filter(
        &self,
        filter_id: &str,
        start_index: usize,
        page_size: usize,
    ) -> Result<Vec<ReplicationItem>, PersistenceError> {
        let items = self.load_all(filter_id)?;
        Ok(items
            .into_iter()
            .skip(start_index)
            .take(page_size)
            .collect())
    }

    async fn remove_all_for_filter(&self, filter_id: &str) -> Result<(), PersistenceError> {
        let path = self.items_path(filter_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Filesystem-backed filter index store.
pub struct FilesystemIndexStore {
    dir: PathBuf,
}

impl FilesystemIndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self, filter_id: &str) -> PathBuf {
        self.dir.join(format!("filter_index_{filter_id}.json"))
    }
}

#[async_trait]
impl FilterIndexStore for FilesystemIndexStore {
    async fn get_or_create(&self, filter_id: &str) -> Result<FilterIndex, PersistenceError> {
        let path = self.index_path(filter_id);
        if !path.exists() {
            return Ok(FilterIndex::new(filter_id));
        }
        let content = fs::read_to_string(&path)?;
        let record: FilterIndexRecord = serde_json::from_str(&content)?;
        FilterIndex::from_record(record)
    }

    async fn save(&self, index: &FilterIndex) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        let record = index.to_record();
        fs::write(
            self.index_path(&index.id),
            serde_json::to_string_pretty(&record)?,
        )?;
        tracing::debug!("stored index for filter {}", index.id);
        Ok(())
    }
}
