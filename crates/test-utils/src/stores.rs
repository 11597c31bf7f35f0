use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use playgate::errors::{PlaygateError, Result};
use playgate::metrics::{MemoryStore, MetricRecord, MetricsSink, MetricsStore};

/// A store whose every append fails, counting the attempts.
#[derive(Debug, Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MetricsStore for FailingStore {
    fn append(&self, _record: &MetricRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PlaygateError::Metrics("disk full".to_string()))
    }

    fn load(&self) -> Result<Vec<MetricRecord>> {
        Err(PlaygateError::Metrics("ledger unreadable".to_string()))
    }
}

/// A sink over a fresh in-memory store, plus the store for assertions.
///
/// Must be called inside a Tokio runtime.
pub fn memory_sink() -> (MetricsSink, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let sink = MetricsSink::spawn(store.clone());
    (sink, store)
}
