//! Catalog metadata records.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag stamped onto every record before it is handed to a destination, so
/// replicated copies are distinguishable from originals.
pub const REPLICATED_TAG: &str = "replicated";

/// A record yielded by a source query.
///
/// `tags` and `lineage` are the two collections the engine mutates before
/// sending: the replicated tag is added and the source's system name is
/// appended to the lineage trail. Everything else travels untouched; the
/// engine performs no content transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Stable id, unique per source.
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub metadata_modified: DateTime<Utc>,
    #[serde(default)]
    pub metadata_size: Option<u64>,
    /// Location of the associated binary resource, if the record has one.
    #[serde(default)]
    pub resource_uri: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub resource_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resource_size: Option<u64>,
    /// Marks a record the source has deleted; the destination copy should go
    /// too, provided one was ever transferred.
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub tags: HashSet<String>,
    /// Ordered trail of source-system names the record has traversed.
    #[serde(default)]
    pub lineage: Vec<String>,
    /// The record document itself, opaque to the engine.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Metadata {
    pub fn new(id: impl Into<String>, metadata_modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            metadata_modified,
            metadata_size: None,
            resource_uri: None,
            resource_modified: None,
            resource_size: None,
            is_deleted: false,
            tags: HashSet::new(),
            lineage: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn has_resource(&self) -> bool {
        self.resource_uri.is_some()
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn append_lineage(&mut self, system_name: impl Into<String>) {
        self.lineage.push(system_name.into());
    }
}
