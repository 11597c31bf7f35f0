// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Env var consulted when no `--config` flag is given.
pub const CONFIG_ENV_VAR: &str = "PLAYGATE_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks durations, regexes, required tool fields and the action catalog.
/// - Anchors a relative metrics ledger path at the config file's directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    config
        .metrics
        .resolve_relative_to(&config_root_dir(path.as_ref()));
    Ok(config)
}

/// Resolve the config path: `PLAYGATE_CONFIG` if set, else `Playgate.toml`
/// in the current working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Playgate.toml"))
}

/// Directory relative paths in the config are anchored to.
///
/// - If the config path has a non-empty parent (e.g. "deploy/Playgate.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Playgate.toml" (parent = ""),
///   we fall back to the current working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
