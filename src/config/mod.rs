// src/config/mod.rs

//! Configuration loading and validation for playgate.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the typed settings (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into settings objects (`validate.rs`).
//! - Hold the optional per-target action contracts (`catalog.rs`).

pub mod catalog;
pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use catalog::{ActionCatalog, ActionContract};
pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, MetricsSettings, NormalizerSettings, RawConfigFile, RunnerSettings,
    StreamSettings, ToolSettings,
};
