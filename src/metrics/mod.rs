// src/metrics/mod.rs

//! Execution metrics ledger.
//!
//! - [`record`]: the append-only `MetricRecord`.
//! - [`store`]: `MetricsStore` backends (memory, JSON-lines file).
//! - [`sink`]: the non-blocking `MetricsSink` handle used by runners.
//! - [`aggregate`]: read-side reduction for reporting.

pub mod aggregate;
pub mod record;
pub mod sink;
pub mod store;

pub use aggregate::MetricsSummary;
pub use record::MetricRecord;
pub use sink::MetricsSink;
pub use store::{open_store, JsonLinesStore, MemoryStore, MetricsStore};
