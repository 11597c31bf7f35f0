// src/exec/outcome.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::report::NormalizedResult;

/// Return code reported when there is no real exit status (spawn failure,
/// forced termination).
pub const SENTINEL_RETURN_CODE: i32 = -1;

/// Prefix of the stderr line appended when the runner kills a slow process.
pub const TIMEOUT_MARKER: &str = "playgate: execution timed out";

/// Prefix of the stderr line appended when a run is cancelled.
pub const CANCELLED_MARKER: &str = "playgate: execution cancelled";

/// Which failure mode (if any) an execution ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Exit 0 and a Success shape.
    Success,
    /// The report names a failed task.
    InBandFailure,
    /// The report has no failed task but the process exited non-zero.
    NonZeroExit,
    /// Stdout was not a report at all.
    UnparsableOutput,
    Timeout,
    /// The executable could not be spawned or waited on.
    Transport,
    Cancelled,
}

/// Everything the caller gets back from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub return_code: i32,
    /// `None` when stdout could not be parsed (or no process output exists).
    pub normalized: Option<NormalizedResult>,
    pub stderr: String,
    pub raw_stdout: Option<String>,
    pub kind: OutcomeKind,
}

impl ExecutionOutcome {
    /// The process exited and its stdout parsed into a report.
    pub fn parsed(return_code: i32, normalized: NormalizedResult, stderr: String) -> Self {
        let kind = match (&normalized, return_code) {
            (NormalizedResult::Failure { .. }, _) => OutcomeKind::InBandFailure,
            (NormalizedResult::Success { .. }, 0) => OutcomeKind::Success,
            (NormalizedResult::Success { .. }, _) => OutcomeKind::NonZeroExit,
        };
        Self {
            return_code,
            normalized: Some(normalized),
            stderr,
            raw_stdout: None,
            kind,
        }
    }

    /// The process exited but stdout was not machine-readable.
    pub fn unparsable(return_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            return_code,
            normalized: None,
            stderr,
            raw_stdout: Some(stdout),
            kind: OutcomeKind::UnparsableOutput,
        }
    }

    pub fn transport_failure(message: String) -> Self {
        Self {
            return_code: SENTINEL_RETURN_CODE,
            normalized: None,
            stderr: message,
            raw_stdout: None,
            kind: OutcomeKind::Transport,
        }
    }

    pub fn timed_out(timeout: Duration, stdout: String, stderr: String) -> Self {
        Self::terminated(
            OutcomeKind::Timeout,
            format!("{TIMEOUT_MARKER} after {:.3}s", timeout.as_secs_f64()),
            stdout,
            stderr,
        )
    }

    pub fn cancelled(stdout: String, stderr: String) -> Self {
        Self::terminated(
            OutcomeKind::Cancelled,
            CANCELLED_MARKER.to_string(),
            stdout,
            stderr,
        )
    }

    fn terminated(kind: OutcomeKind, marker: String, stdout: String, mut stderr: String) -> Self {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&marker);
        Self {
            return_code: SENTINEL_RETURN_CODE,
            normalized: None,
            stderr,
            raw_stdout: (!stdout.is_empty()).then_some(stdout),
            kind,
        }
    }

    /// Exit 0 and a Success shape.
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
            && self
                .normalized
                .as_ref()
                .is_some_and(NormalizedResult::is_success)
    }

    /// Status an HTTP front end should answer with.
    pub fn http_status(&self) -> u16 {
        if self.succeeded() { 200 } else { 500 }
    }
}
