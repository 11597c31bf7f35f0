use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{PlaygateError, Result};

/// Action-specific fields, passed through to the external tool verbatim.
pub type Payload = Map<String, Value>;

/// One inbound request: which automation domain, which operation, and the
/// operation's parameters.
///
/// `target` and `action` select the command variant on the tool's side; the
/// payload is opaque to this crate. Values are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(alias = "service")]
    target: String,
    #[serde(alias = "user_action")]
    action: String,
    #[serde(default)]
    payload: Payload,
}

impl ExecutionRequest {
    pub fn new(target: impl Into<String>, action: impl Into<String>, payload: Payload) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            payload,
        }
    }

    /// Build a request from already-separated parts, rejecting a blank
    /// target or action the same way the wire form does.
    pub fn addressed(
        target: impl Into<String>,
        action: impl Into<String>,
        payload: Payload,
    ) -> Result<Self> {
        let req = Self::new(target, action, payload);
        req.ensure_addressed()?;
        Ok(req)
    }

    /// Decode a request from its JSON wire form.
    ///
    /// Accepts `{"target", "action", "payload"}` as well as the older
    /// `{"service", "user_action", "payload"}` spelling.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let req: ExecutionRequest = serde_json::from_str(text)?;
        req.ensure_addressed()?;
        Ok(req)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The single `--extra-vars` JSON object handed to the tool.
    pub fn extra_vars(&self) -> String {
        // A struct of strings and a JSON map cannot fail to serialise.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn ensure_addressed(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(PlaygateError::InvalidRequest(
                "request is missing a target".to_string(),
            ));
        }
        if self.action.trim().is_empty() {
            return Err(PlaygateError::InvalidRequest(
                "request is missing an action".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome label written to the metrics ledger.
///
/// Derived from the process exit code alone: an in-band failure reported by
/// a tool that still exits 0 is labeled `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricOutcome {
    Success,
    Failure,
}

impl MetricOutcome {
    pub fn from_return_code(code: i32) -> Self {
        if code == 0 {
            MetricOutcome::Success
        } else {
            MetricOutcome::Failure
        }
    }
}

impl fmt::Display for MetricOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricOutcome::Success => f.write_str("success"),
            MetricOutcome::Failure => f.write_str("failure"),
        }
    }
}

/// Where metric records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsStoreKind {
    /// Append-only JSON-lines file.
    File,
    /// In-memory only (lost on exit).
    Memory,
}

impl Default for MetricsStoreKind {
    fn default() -> Self {
        MetricsStoreKind::File
    }
}
