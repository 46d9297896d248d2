//! Node adapter interface.
//!
//! A [`NodeAdapter`] abstracts one catalog endpoint, source or destination.
//! The engine depends only on this surface; concrete adapters (HTTP/REST
//! clients and the like) live outside the core and are handed in per job.
//! Adapters are not assumed shareable across jobs; each job owns its pair.
//!
//! Change sets are consumed through [`MetadataStream`], pulled one record at
//! a time so the engine never buffers an unbounded result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::metadata::Metadata;

/// Failure of an adapter operation, transport-side or remote-side.
///
/// The engine does not interpret the variants; it classifies every adapter
/// error by probing node availability afterwards. The split exists for
/// adapter implementors and log readers.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The request never completed (connection refused, timeout, broken
    /// stream).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with an error.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote answered with something unparseable.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A change query against a source node.
///
/// Semantics: records matching `query` that the excluded destinations do
/// not already hold, plus records whose ids appear in `failed_ids`,
/// restricted to records modified after `modified_after` when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    /// System names of destinations whose holdings are excluded.
    pub exclusions: Vec<String>,
    /// Ids forcibly re-included regardless of the watermark.
    pub failed_ids: Vec<String>,
    pub modified_after: Option<DateTime<Utc>>,
}

impl QueryRequest {
    pub fn new(
        query: impl Into<String>,
        exclusions: Vec<String>,
        failed_ids: Vec<String>,
        modified_after: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            query: query.into(),
            exclusions,
            failed_ids,
            modified_after,
        }
    }
}

/// Lazily streamed result of a change query, consumed once.
///
/// Records are expected in non-decreasing `metadata_modified` order, but
/// the engine does not rely on strict ordering for correctness.
#[async_trait]
pub trait MetadataStream: Send {
    /// Next record, `None` when the change set is exhausted.
    async fn next(&mut self) -> Option<Result<Metadata, AdapterError>>;
}

/// Request to read the binary resource behind a record.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub metadata: Metadata,
}

impl ResourceRequest {
    pub fn new(metadata: Metadata) -> Self {
        Self { metadata }
    }
}

/// A binary resource together with the record it belongs to.
#[derive(Debug, Clone)]
pub struct Resource {
    pub metadata: Metadata,
    pub content: Vec<u8>,
}

/// Response to a [`ResourceRequest`].
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    pub resource: Resource,
}

/// Metadata-only create.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub metadata: Vec<Metadata>,
}

impl CreateRequest {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata: vec![metadata],
        }
    }
}

/// Metadata-only update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub metadata: Vec<Metadata>,
}

impl UpdateRequest {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata: vec![metadata],
        }
    }
}

/// Metadata-only delete.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub metadata: Vec<Metadata>,
}

impl DeleteRequest {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata: vec![metadata],
        }
    }
}

/// Create carrying metadata plus binary payload.
#[derive(Debug, Clone)]
pub struct CreateStorageRequest {
    pub resources: Vec<Resource>,
}

impl CreateStorageRequest {
    pub fn new(resource: Resource) -> Self {
        Self {
            resources: vec![resource],
        }
    }
}

/// Update carrying metadata plus binary payload.
#[derive(Debug, Clone)]
pub struct UpdateStorageRequest {
    pub resources: Vec<Resource>,
}

impl UpdateStorageRequest {
    pub fn new(resource: Resource) -> Self {
        Self {
            resources: vec![resource],
        }
    }
}

/// One catalog endpoint.
///
/// Boolean-returning operations report whether the remote accepted the
/// request; errors are reserved for transport and remote failures. The
/// `is_available` probe must stay cheap: it is called only to classify a
/// failure that already happened.
#[async_trait]
pub trait NodeAdapter: Send + Sync {
    /// Stable identifier used for lineage and log context.
    fn system_name(&self) -> &str;

    /// Liveness probe used by the failure classifier.
    async fn is_available(&self) -> bool;

    /// Stream records matching the request.
    async fn query(
        &self,
        request: QueryRequest,
    ) -> Result<Box<dyn MetadataStream>, AdapterError>;

    /// Whether this node already holds a record with the same id.
    async fn exists(&self, metadata: &Metadata) -> Result<bool, AdapterError>;

    /// Stream the binary payload for a record from this node.
    async fn read_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<ResourceResponse, AdapterError>;

    async fn create(&self, request: CreateRequest) -> Result<bool, AdapterError>;

    async fn update(&self, request: UpdateRequest) -> Result<bool, AdapterError>;

    async fn delete(&self, request: DeleteRequest) -> Result<bool, AdapterError>;

    async fn create_resource(
        &self,
        request: CreateStorageRequest,
    ) -> Result<bool, AdapterError>;

    async fn update_resource(
        &self,
        request: UpdateStorageRequest,
    ) -> Result<bool, AdapterError>;
}
