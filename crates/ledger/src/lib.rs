//! Durable bookkeeping for catalog replication.
//!
//! Replication is incremental and resumable; this crate owns the two pieces
//! of state that make it so:
//!
//! - The **item ledger**: an append-only history of per-record transfer
//!   attempts. The latest entry for a `(filter, record)` pair answers
//!   "what happened last", and the set of records whose latest entry did
//!   not succeed forms the failure list re-queried on the next pass.
//! - The **filter index**: one watermark per filter, the greatest record
//!   modification time observed so far. A pass only considers records
//!   modified after it.
//!
//! # Architecture
//!
//! ```text
//! ledger (this crate)
//!    │
//!    ├─── ItemLedger / FilterIndexStore   (storage traits)
//!    │       ├─── MemoryLedger / MemoryIndexStore
//!    │       └─── FilesystemLedger / FilesystemIndexStore
//!    │
//!    └─── catalog-sync                    (the engine, consumes the traits)
//! ```
//!
//! Stored forms are versioned JSON; see [`FilterIndexRecord`] for the read
//! rule that keeps old binaries from misreading new state.

mod config;
mod error;
mod filesystem;
mod index;
mod item;
mod memory;
mod store;


pub use config::StorageConfig;
pub use error::PersistenceError;
pub use filesystem::{FilesystemIndexStore, FilesystemLedger};
pub use index::{FilterIndex, FilterIndexRecord, CURRENT_VERSION, MINIMUM_VERSION};
pub use item::{Action, ReplicationItem, ReplicationItemBuilder, Status};
pub use memory::{MemoryIndexStore, MemoryLedger};
pub use store::{FilterIndexStore, ItemLedger};
