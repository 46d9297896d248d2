//! catalog-sync
//!
//! A library for replicating catalog metadata records, and optionally their
//! binary resources, from a source node to a destination node.
//!
//! # Features
//!
//! - Incremental synchronization: each filter keeps a persisted watermark of
//!   the last observed record modification time
//! - Resumability: records whose last transfer attempt did not succeed are
//!   forcibly re-queried on the next pass
//! - Create/update/delete decision tree driven by destination state and
//!   local history, self-healing when either is lost
//! - Split transfer policy: metadata-only and metadata-plus-resource paths
//! - Failure classification separating connectivity loss from record-level
//!   failures
//!
//! # Architecture
//!
//! ```text
//! catalog-sync (this crate)
//!    │
//!    ├─── Syncer / Job        one replication pass per filter
//!    ├─── NodeAdapter         trait over catalog endpoints (implement per wire protocol)
//!    ├─── ObserverSet         per-item completion fan-out
//!    │
//!    └─── ledger              durable bookkeeping (crates/ledger)
//!            ├─── ItemLedger          per-record attempt history + failure list
//!            └─── FilterIndexStore    per-filter watermark
//! ```
//!
//! The outer system supplies adapters, decides which filters to run when,
//! and may run jobs for different filters concurrently; two concurrent jobs
//! on the same filter are not supported. Delivery is at-least-once with
//! idempotent replay: an unchanged record re-offered to a pass is skipped
//! without a new ledger entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use catalog_sync::{Filter, ObserverSet, Syncer};
//! use ledger::{MemoryIndexStore, MemoryLedger};
//!
//! let syncer = Syncer::new(Arc::new(MemoryLedger::new()), Arc::new(MemoryIndexStore::new()));
//! let filter = Filter::new("f1", "imagery", "type = 'imagery'");
//! let job = syncer
//!     .create_job(Box::new(source), Box::new(destination), filter, ObserverSet::new())
//!     .await?;
//! let report = job.sync().await?;
//! println!("saved {} items", report.saved);
//! ```

pub mod adapter;
pub mod filter;
pub mod metadata;
pub mod observer;
pub mod syncer;
pub mod testing;

pub use adapter::{
    AdapterError, CreateRequest, CreateStorageRequest, DeleteRequest, MetadataStream, NodeAdapter,
    QueryRequest, Resource, ResourceRequest, ResourceResponse, UpdateRequest, UpdateStorageRequest,
};
pub use filter::Filter;
pub use metadata::{Metadata, REPLICATED_TAG};
pub use observer::{ItemObserver, ObserverSet};
pub use syncer::{Job, SyncReport, Syncer};

// Bookkeeping types are part of this crate's public surface.
pub use ledger::{
    Action, FilterIndex, FilterIndexStore, ItemLedger, PersistenceError, ReplicationItem, Status,
    StorageConfig,
};
