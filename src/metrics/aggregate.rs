// src/metrics/aggregate.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::metrics::record::MetricRecord;
use crate::types::MetricOutcome;

/// Counts by outcome and mean duration per action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub success_count: u64,
    pub failure_count: u64,
    pub total: u64,
    pub mean_duration_by_action: BTreeMap<String, f64>,
}

impl MetricsSummary {
    pub fn from_records(records: &[MetricRecord]) -> Self {
        let mut summary = MetricsSummary::default();
        let mut durations: BTreeMap<&str, (f64, u64)> = BTreeMap::new();

        for record in records {
            match record.outcome {
                MetricOutcome::Success => summary.success_count += 1,
                MetricOutcome::Failure => summary.failure_count += 1,
            }
            let entry = durations.entry(record.action.as_str()).or_default();
            entry.0 += record.duration_seconds;
            entry.1 += 1;
        }

        summary.total = summary.success_count + summary.failure_count;
        summary.mean_duration_by_action = durations
            .into_iter()
            .map(|(action, (sum, count))| (action.to_string(), sum / count as f64))
            .collect();
        summary
    }

    /// Means rounded to milliseconds, for display.
    pub fn rounded(mut self) -> Self {
        for mean in self.mean_duration_by_action.values_mut() {
            *mean = (*mean * 1000.0).round() / 1000.0;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counts_and_means() {
        let records = vec![
            MetricRecord::new("user", "create", MetricOutcome::Success, Duration::from_secs(1)),
            MetricRecord::new("user", "create", MetricOutcome::Failure, Duration::from_secs(2)),
            MetricRecord::new("webserver", "list", MetricOutcome::Success, Duration::from_millis(333)),
        ];

        let summary = MetricsSummary::from_records(&records);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.mean_duration_by_action["create"], 1.5);
        assert_eq!(summary.rounded().mean_duration_by_action["list"], 0.333);
    }

    #[test]
    fn empty_ledger() {
        let summary = MetricsSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.mean_duration_by_action.is_empty());
    }
}
