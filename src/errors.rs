// src/errors.rs

//! Crate-wide error type.
//!
//! Process-level failures (spawn errors, timeouts, unparsable output) are
//! never surfaced through this type; the runner turns them into
//! [`ExecutionOutcome`](crate::exec::ExecutionOutcome) values. `PlaygateError`
//! covers configuration, request decoding and the metrics read-side.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaygateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action '{action}' for target '{target}'")]
    UnknownAction { target: String, action: String },

    #[error("Metrics store error: {0}")]
    Metrics(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PlaygateError>;
