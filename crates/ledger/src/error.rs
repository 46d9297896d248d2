//! Error types for ledger and index persistence.

use thiserror::Error;

/// Errors surfaced by the bookkeeping stores.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Backend-specific storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A record is missing a required field.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A stored record predates the oldest supported version.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
}
