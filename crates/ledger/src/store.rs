//! Storage traits for the replication bookkeeping.
//!
//! Two traits abstract the durable state a sync pass depends on, allowing
//! the same engine to run against in-memory state in tests and embedded
//! setups or a shared filesystem directory in deployments:
//!
//! - [`ItemLedger`] - append-only history of per-record transfer attempts
//! - [`FilterIndexStore`] - per-filter watermark persistence
//!
//! Implementations are shared across concurrently running sync passes and
//! must serialize writes internally.

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::index::FilterIndex;
use crate::item::ReplicationItem;

/// Append-only history of transfer attempts.
#[async_trait]
pub trait ItemLedger: Send + Sync {
    /// The entry with the greatest `done_time` for the pair, if any.
    ///
    /// Storage failures are logged by the implementation and surface as
    /// `None`, so callers treat "no history" and "unknown history"
    /// uniformly.
    async fn get_latest(&self, filter_id: &str, metadata_id: &str) -> Option<ReplicationItem>;

    /// Ids whose latest entry for this filter did not succeed. No
    /// duplicates; order is unspecified.
    async fn failure_list(&self, filter_id: &str) -> Result<Vec<String>, PersistenceError>;

    /// Append an entry. Durable before return.
    async fn save(&self, item: &ReplicationItem) -> Result<(), PersistenceError>;

    /// Paged listing of all entries for a filter, in storage order.
    async fn all_for_filter(
        &self,
        filter_id: &str,
        start_index: usize,
        page_size: usize,
    ) -> Result<Vec<ReplicationItem>, PersistenceError>;

    /// Purge every entry for a filter. Used when the filter is deleted.
    async fn remove_all_for_filter(&self, filter_id: &str) -> Result<(), PersistenceError>;
}

/// Per-filter watermark persistence.
#[async_trait]
pub trait FilterIndexStore: Send + Sync {
    /// The stored index for the filter, or a fresh one with an empty
    /// watermark. Only a corrupt or version-unsupported stored record
    /// errors; absence never does.
    async fn get_or_create(&self, filter_id: &str) -> Result<FilterIndex, PersistenceError>;

    /// Durably persist the current watermark.
    async fn save(&self, index: &FilterIndex) -> Result<(), PersistenceError>;
}
