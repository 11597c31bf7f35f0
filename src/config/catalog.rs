// src/config/catalog.rs

//! Per-target action contracts.
//!
//! The catalog is a front-end guard: it runs before a request is handed to
//! the runner. The runner itself never looks inside a payload.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::model::TargetSection;
use crate::errors::{PlaygateError, Result};
use crate::types::ExecutionRequest;

/// Contract for one `(target, action)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionContract {
    pub required: Vec<String>,
}

/// Declared targets and their actions. Empty means "accept everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionCatalog {
    targets: BTreeMap<String, BTreeMap<String, ActionContract>>,
}

impl ActionCatalog {
    pub fn from_sections(sections: &BTreeMap<String, TargetSection>) -> Self {
        let targets = sections
            .iter()
            .map(|(target, section)| {
                let actions = section
                    .action
                    .iter()
                    .map(|(action, spec)| {
                        (
                            action.clone(),
                            ActionContract {
                                required: spec.required.clone(),
                            },
                        )
                    })
                    .collect();
                (target.clone(), actions)
            })
            .collect();
        Self { targets }
    }

    pub fn with_action(mut self, target: &str, action: &str, required: &[&str]) -> Self {
        self.targets.entry(target.to_string()).or_default().insert(
            action.to_string(),
            ActionContract {
                required: required.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Iterate `(target, action, contract)` in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &ActionContract)> {
        self.targets.iter().flat_map(|(target, actions)| {
            actions
                .iter()
                .map(move |(action, contract)| (target.as_str(), action.as_str(), contract))
        })
    }

    /// Reject requests the catalog does not declare, or whose payload lacks
    /// a required key.
    pub fn check(&self, req: &ExecutionRequest) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let contract = self
            .targets
            .get(req.target())
            .and_then(|actions| actions.get(req.action()))
            .ok_or_else(|| PlaygateError::UnknownAction {
                target: req.target().to_string(),
                action: req.action().to_string(),
            })?;

        let missing: Vec<&str> = contract
            .required
            .iter()
            .filter(|key| is_blank(req.payload().get(key.as_str())))
            .map(|key| key.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(PlaygateError::InvalidRequest(format!(
                "action '{}' on target '{}' requires payload field(s): {}",
                req.action(),
                req.target(),
                missing.join(", ")
            )));
        }

        Ok(())
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}
