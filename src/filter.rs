//! Filter definitions.

use serde::{Deserialize, Serialize};

/// A named, stored query defining which source records are subject to
/// replication. Immutable from the engine's perspective; filter management
/// lives outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Stable identity, used to key ledger entries and the watermark index.
    pub id: String,
    /// Human name, used in log context.
    pub name: String,
    /// Query expression understood by source adapters.
    pub query: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Filter {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            query: query.into(),
            description: None,
        }
    }
}
