// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

use crate::config::catalog::ActionCatalog;
use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, MetricsSettings, NormalizerSettings, RawConfigFile, RunnerSettings,
    StreamSettings, ToolSettings,
};
use crate::errors::{PlaygateError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PlaygateError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let tool = validate_tool(&raw)?;
        let runner = validate_runner(&raw)?;
        let stream = validate_stream(&raw)?;
        let metrics = validate_metrics(&raw)?;
        let normalizer = validate_normalizer(&raw)?;
        validate_catalog(&raw)?;

        Ok(ConfigFile::new_unchecked(
            tool,
            runner,
            stream,
            metrics,
            normalizer,
            ActionCatalog::from_sections(&raw.target),
        ))
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PlaygateError::ConfigError(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

fn validate_tool(cfg: &RawConfigFile) -> Result<ToolSettings> {
    let tool = &cfg.tool;
    require_non_empty(&tool.executable, "[tool].executable")?;
    require_non_empty(&tool.inventory, "[tool].inventory")?;
    require_non_empty(&tool.playbook, "[tool].playbook")?;
    require_non_empty(&tool.structured_output_env, "[tool].structured_output_env")?;

    let vault_password_file = match tool.vault_password_file.as_deref() {
        Some(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
        _ => None,
    };

    Ok(ToolSettings {
        executable: PathBuf::from(&tool.executable),
        inventory: PathBuf::from(&tool.inventory),
        playbook: PathBuf::from(&tool.playbook),
        vault_password_file,
        structured_output_env: (
            tool.structured_output_env.clone(),
            tool.structured_output_value.clone(),
        ),
        env: tool.env.clone(),
    })
}

/// Parse a duration field and insist on a non-zero value.
fn positive_duration(value: &str, field: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| PlaygateError::ConfigError(format!("{field}: {e}")))?;
    if dur.is_zero() {
        return Err(PlaygateError::ConfigError(format!(
            "{field} must be greater than zero (got \"{value}\")"
        )));
    }
    Ok(dur)
}

fn validate_runner(cfg: &RawConfigFile) -> Result<RunnerSettings> {
    if cfg.runner.max_concurrent == 0 {
        return Err(PlaygateError::ConfigError(
            "[runner].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(RunnerSettings {
        timeout: positive_duration(&cfg.runner.timeout, "[runner].timeout")?,
        max_concurrent: cfg.runner.max_concurrent,
        kill_grace: positive_duration(&cfg.runner.kill_grace, "[runner].kill_grace")?,
    })
}

fn validate_stream(cfg: &RawConfigFile) -> Result<StreamSettings> {
    let session_timeout = cfg
        .stream
        .session_timeout
        .as_deref()
        .map(|s| positive_duration(s, "[stream].session_timeout"))
        .transpose()?;

    Ok(StreamSettings {
        line_idle_timeout: positive_duration(
            &cfg.stream.line_idle_timeout,
            "[stream].line_idle_timeout",
        )?,
        session_timeout,
        kill_grace: positive_duration(&cfg.stream.kill_grace, "[stream].kill_grace")?,
    })
}

fn validate_metrics(cfg: &RawConfigFile) -> Result<MetricsSettings> {
    require_non_empty(&cfg.metrics.path, "[metrics].path")?;
    Ok(MetricsSettings {
        store: cfg.metrics.store,
        path: PathBuf::from(&cfg.metrics.path),
    })
}

fn validate_normalizer(cfg: &RawConfigFile) -> Result<NormalizerSettings> {
    let section = &cfg.normalizer;
    let display_pattern = Regex::new(&section.display_pattern).map_err(|e| {
        PlaygateError::ConfigError(format!(
            "[normalizer].display_pattern is not a valid regex: {e}"
        ))
    })?;

    Ok(NormalizerSettings {
        display_pattern,
        unnamed_task: section.unnamed_task.clone(),
        missing_reason: section.missing_reason.clone(),
    })
}

fn validate_catalog(cfg: &RawConfigFile) -> Result<()> {
    for (target, section) in cfg.target.iter() {
        for (action, spec) in section.action.iter() {
            if spec.required.iter().any(|key| key.trim().is_empty()) {
                return Err(PlaygateError::ConfigError(format!(
                    "[target.{target}.action.{action}].required contains an empty field name"
                )));
            }
        }
    }
    Ok(())
}
