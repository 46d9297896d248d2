//! Replication item records.
//!
//! A [`ReplicationItem`] is the durable outcome of one transfer attempt for
//! one metadata record under one filter. Items are immutable once built and
//! append-only from the engine's point of view; history questions ("what
//! happened to this record last?") are answered by the ledger, not by
//! mutating entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// The operation a sync pass chose for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a transfer attempt ended.
///
/// `ConnectionLost` is distinguished from `Failure` so operators can tell a
/// connectivity blip from a record the destination actually rejected; both
/// put the record on the failure list for the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failure,
    ConnectionLost,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::ConnectionLost => "CONNECTION_LOST",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed transfer attempt.
///
/// Serialized field names and timestamp encoding (epoch milliseconds) are
/// part of the persistence contract; storage backends must not remap them.
/// Entry identity is storage-assigned, so the record itself carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationItem {
    pub metadata_id: String,
    pub filter_id: String,
    #[serde(rename = "source")]
    pub source_name: String,
    #[serde(rename = "destination")]
    pub destination_name: String,
    pub action: Action,
    pub status: Status,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub done_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub metadata_modified: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub resource_modified: Option<DateTime<Utc>>,
    pub metadata_size: Option<u64>,
    pub resource_size: Option<u64>,
}

impl ReplicationItem {
    /// Start building an item for one transfer attempt.
    pub fn builder(
        metadata_id: impl Into<String>,
        filter_id: impl Into<String>,
        source_name: impl Into<String>,
        destination_name: impl Into<String>,
    ) -> ReplicationItemBuilder {
        ReplicationItemBuilder {
            metadata_id: metadata_id.into(),
            filter_id: filter_id.into(),
            source_name: source_name.into(),
            destination_name: destination_name.into(),
            action: None,
            status: None,
            start_time: None,
            done_time: None,
            metadata_modified: None,
            resource_modified: None,
            metadata_size: None,
            resource_size: None,
        }
    }
}

/// Builder that accompanies a record through one pipeline pass.
///
/// The engine stamps `start_time` the moment an action is chosen and
/// `done_time` once the transfer attempt returns, then sets the action and
/// status it observed. `build` fails if any of those were never set, which
/// keeps half-finished attempts out of the ledger.
#[derive(Debug, Clone)]
pub struct ReplicationItemBuilder {
    metadata_id: String,
    filter_id: String,
    source_name: String,
    destination_name: String,
    action: Option<Action>,
    status: Option<Status>,
    start_time: Option<DateTime<Utc>>,
    done_time: Option<DateTime<Utc>>,
    metadata_modified: Option<DateTime<Utc>>,
    resource_modified: Option<DateTime<Utc>>,
    metadata_size: Option<u64>,
    resource_size: Option<u64>,
}

impl ReplicationItemBuilder {
    pub fn metadata_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.metadata_modified = Some(modified);
        self
    }

    pub fn resource_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.resource_modified = modified;
        self
    }

    pub fn metadata_size(mut self, size: Option<u64>) -> Self {
        self.metadata_size = size;
        self
    }

    pub fn resource_size(mut self, size: Option<u64>) -> Self {
        self.resource_size = size;
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Stamp the moment the action was chosen.
    pub fn mark_start_time(&mut self) {
        self.start_time = Some(Utc::now());
    }

    /// Stamp the moment the transfer attempt returned.
    pub fn mark_done_time(&mut self) {
        self.done_time = Some(Utc::now());
    }

    pub fn build(self) -> Result<ReplicationItem, PersistenceError> {
        let action = self
            .action
            .ok_or_else(|| PersistenceError::InvalidField("missing replication_item action".into()))?;
        let status = self
            .status
            .ok_or_else(|| PersistenceError::InvalidField("missing replication_item status".into()))?;
        let start_time = self.start_time.ok_or_else(|| {
            PersistenceError::InvalidField("missing replication_item start_time".into())
        })?;
        let done_time = self.done_time.ok_or_else(|| {
            PersistenceError::InvalidField("missing replication_item done_time".into())
        })?;
        let metadata_modified = self.metadata_modified.ok_or_else(|| {
            PersistenceError::InvalidField("missing replication_item metadata_modified".into())
        })?;

        Ok(ReplicationItem {
            metadata_id: self.metadata_id,
            filter_id: self.filter_id,
            source_name: self.source_name,
            destination_name: self.destination_name,
            action,
            status,
            start_time,
            done_time,
            metadata_modified,
            resource_modified: self.resource_modified,
            metadata_size: self.metadata_size,
            resource_size: self.resource_size,
        })
    }
}
