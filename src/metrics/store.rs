// src/metrics/store.rs

//! Storage backends for the metrics ledger.

use std::fmt::Debug;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::config::MetricsSettings;
use crate::errors::{PlaygateError, Result};
use crate::metrics::record::MetricRecord;
use crate::types::MetricsStoreKind;

/// Append-only record store.
///
/// Implementations are called from a single writer task, but `load` may run
/// concurrently with `append`, so both take `&self`.
pub trait MetricsStore: Send + Sync + Debug {
    fn append(&self, record: &MetricRecord) -> Result<()>;
    fn load(&self) -> Result<Vec<MetricRecord>>;
}

/// Build the store described by `[metrics]`.
pub fn open_store(settings: &MetricsSettings) -> Arc<dyn MetricsStore> {
    match settings.store {
        MetricsStoreKind::File => Arc::new(JsonLinesStore::new(&settings.path)),
        MetricsStoreKind::Memory => Arc::new(MemoryStore::new()),
    }
}

fn poisoned() -> PlaygateError {
    PlaygateError::Metrics("metrics store lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MetricsStore for MemoryStore {
    fn append(&self, record: &MetricRecord) -> Result<()> {
        self.records.lock().map_err(|_| poisoned())?.push(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<MetricRecord>> {
        Ok(self.records.lock().map_err(|_| poisoned())?.clone())
    }
}

/// One JSON object per line, appended to a file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsStore for JsonLinesStore {
    fn append(&self, record: &MetricRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Single write per record so a line is never interleaved.
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<MetricRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        error = %e,
                        "skipping malformed metrics line"
                    );
                }
            }
        }
        Ok(records)
    }
}
