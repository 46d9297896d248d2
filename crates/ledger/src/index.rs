//! Per-filter watermark index.
//!
//! A [`FilterIndex`] holds the greatest `metadata_modified` a sync pass has
//! observed for a filter. The watermark tracks observation, not transfer
//! success; failed records are re-included through the ledger's failure
//! list, never by holding the watermark back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Version stamped on every written index record.
pub const CURRENT_VERSION: i32 = 1;

/// Oldest record version still readable. Records below this are rejected.
pub const MINIMUM_VERSION: i32 = 1;

/// In-memory watermark state for one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterIndex {
    /// Id of the filter this index belongs to.
    pub id: String,
    /// Greatest record modification time observed so far; `None` until the
    /// first record of the first pass.
    pub modified_since: Option<DateTime<Utc>>,
}

impl FilterIndex {
    /// Fresh index for a filter with no successful observation yet.
    pub fn new(filter_id: impl Into<String>) -> Self {
        Self {
            id: filter_id.into(),
            modified_since: None,
        }
    }

    /// Rebuild from a stored record, enforcing the version read rule:
    /// records older than [`MINIMUM_VERSION`] are unsupported, records newer
    /// than [`CURRENT_VERSION`] are accepted as forward-compatible.
    pub fn from_record(record: FilterIndexRecord) -> Result<Self, PersistenceError> {
        if record.version < MINIMUM_VERSION {
            return Err(PersistenceError::UnsupportedVersion(format!(
                "unsupported filter_index version {} for filter {}",
                record.version, record.id
            )));
        }
        if record.id.is_empty() {
            return Err(PersistenceError::InvalidField(
                "missing filter_index id".into(),
            ));
        }
        Ok(Self {
            id: record.id,
            modified_since: record.modified_since,
        })
    }

    /// Serialize to the stored form, stamping [`CURRENT_VERSION`].
    pub fn to_record(&self) -> FilterIndexRecord {
        FilterIndexRecord {
            id: self.id.clone(),
            modified_since: self.modified_since,
            version: CURRENT_VERSION,
        }
    }
}

/// Stored form of a filter index.
///
/// Keyed by the filter id; `modified_since` is nullable and encoded as epoch
/// milliseconds like every other persisted timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterIndexRecord {
    pub id: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub modified_since: Option<DateTime<Utc>>,
    pub version: i32,
}
