//! Observer fan-out for completed items.

use std::sync::Arc;

use ledger::ReplicationItem;
use tracing::warn;

/// Receives every ledger entry a job saves, synchronously, in save order.
pub trait ItemObserver: Send + Sync {
    fn on_item(&self, item: &ReplicationItem) -> anyhow::Result<()>;
}

/// Set of observer handles registered with a job.
///
/// Registration deduplicates on handle identity, so the same observer
/// passed twice is invoked once per item. An observer error never aborts
/// the job; it is logged and the remaining observers still run.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn ItemObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Returns `false` if this exact handle was
    /// already registered.
    pub fn insert(&mut self, observer: Arc<dyn ItemObserver>) -> bool {
        if self.observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver one saved item to every observer in registration order.
    pub fn notify(&self, item: &ReplicationItem) {
        for observer in &self.observers {
            if let Err(e) = observer.on_item(item) {
                warn!(
                    "observer failed for metadata {} under filter {}: {e}",
                    item.metadata_id, item.filter_id
                );
            }
        }
    }
}
