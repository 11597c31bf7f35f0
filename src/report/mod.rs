// src/report/mod.rs

//! Execution-report handling.
//!
//! - [`model`] deserialises the tool's JSON report.
//! - [`normalize`] reduces it to a [`NormalizedResult`].
//! - [`literal`] parses list literals embedded in free-text messages.

pub mod literal;
pub mod model;
pub mod normalize;

pub use model::{ExecutionReport, HostResult, PlayRecord, Stats, TaskRecord};
pub use normalize::{normalize, NormalizedResult, Normalizer};
