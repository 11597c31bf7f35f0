// src/report/normalize.rs

//! Reduce an execution report to a stable success/failure shape.
//!
//! The scan order matters and is part of the contract:
//! 1. the first failed host result anywhere in the report wins;
//! 2. otherwise the first display task with a message supplies `results`;
//! 3. otherwise `results` is empty.
//!
//! Nothing here performs IO and nothing here can fail: every message shape
//! degrades to "raw text as a single result".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::NormalizerSettings;
use crate::report::literal::parse_sequence;
use crate::report::model::{ExecutionReport, HostResult, Stats, TaskRecord};

/// Canonical, caller-facing result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    Failure {
        stats: Stats,
        failed_task: String,
        reason: String,
    },
    Success {
        stats: Stats,
        results: Vec<Value>,
    },
}

impl NormalizedResult {
    pub fn stats(&self) -> &Stats {
        match self {
            NormalizedResult::Failure { stats, .. } | NormalizedResult::Success { stats, .. } => {
                stats
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NormalizedResult::Success { .. })
    }

    pub fn results(&self) -> Option<&[Value]> {
        match self {
            NormalizedResult::Success { results, .. } => Some(results),
            NormalizedResult::Failure { .. } => None,
        }
    }
}

/// The report normalizer, parameterised by the display-task convention.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    settings: NormalizerSettings,
}

impl Normalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self { settings }
    }

    pub fn normalize(&self, report: &ExecutionReport) -> NormalizedResult {
        let stats = report.stats.clone();

        if let Some((task, host)) = report.host_results().find(|(_, host)| host.failed) {
            return NormalizedResult::Failure {
                stats,
                failed_task: task
                    .name()
                    .unwrap_or(&self.settings.unnamed_task)
                    .to_string(),
                reason: self.failure_reason(host),
            };
        }

        let results = self
            .display_message(report)
            .map(extract_results)
            .unwrap_or_default();

        NormalizedResult::Success { stats, results }
    }

    fn failure_reason(&self, host: &HostResult) -> String {
        match &host.msg {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => self.settings.missing_reason.clone(),
            Some(other) => other.to_string(),
        }
    }

    fn is_display_task(&self, task: &TaskRecord) -> bool {
        self.settings
            .display_pattern
            .is_match(task.name().unwrap_or_default())
    }

    /// Message of the first display task that has one.
    fn display_message<'r>(&self, report: &'r ExecutionReport) -> Option<&'r Value> {
        report
            .host_results()
            .filter(|(task, _)| self.is_display_task(task))
            .find_map(|(_, host)| host.message())
    }
}

/// Normalize with the default display convention.
pub fn normalize(report: &ExecutionReport) -> NormalizedResult {
    Normalizer::default().normalize(report)
}

/// Turn a display message into a result sequence.
fn extract_results(msg: &Value) -> Vec<Value> {
    match msg {
        Value::String(text) => interpret_text(text),
        Value::Object(map) => map.values().next().cloned().map(into_sequence).unwrap_or_default(),
        Value::Array(items) => items.clone(),
        scalar => vec![scalar.clone()],
    }
}

/// Try, in order: JSON object, `label: literal-sequence`, raw text.
fn interpret_text(text: &str) -> Vec<Value> {
    first_value_of_json_object(text)
        .or_else(|| labeled_sequence(text))
        .unwrap_or_else(|| vec![Value::String(text.to_string())])
}

fn first_value_of_json_object(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => map.into_iter().next().map(|(_, first)| into_sequence(first)),
        _ => None,
    }
}

fn labeled_sequence(text: &str) -> Option<Vec<Value>> {
    let (_label, rest) = text.split_once(':')?;
    parse_sequence(rest.trim())
}

fn into_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        other => vec![other],
    }
}
