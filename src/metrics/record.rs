// src/metrics/record.rs

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::MetricOutcome;

/// One ledger entry per execution. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub target: String,
    pub action: String,
    pub outcome: MetricOutcome,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Record stamped with the current time.
    pub fn new(
        target: impl Into<String>,
        action: impl Into<String>,
        outcome: MetricOutcome,
        duration: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            outcome,
            duration_seconds: duration.as_secs_f64(),
            timestamp: Utc::now(),
        }
    }
}
