// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::config::catalog::ActionCatalog;
use crate::types::MetricsStoreKind;

pub const DEFAULT_DISPLAY_PATTERN: &str = "(?i)afficher";
pub const DEFAULT_UNNAMED_TASK: &str = "unknown task";
pub const DEFAULT_MISSING_REASON: &str = "no detailed error message found";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [tool]
/// executable = "/usr/bin/ansible-playbook"
/// inventory = "inventory/hosts.ini"
/// playbook = "playbook.yml"
/// vault_password_file = "/etc/playgate/vault_pass.txt"
///
/// [runner]
/// timeout = "10m"
///
/// [target.user.action.create]
/// required = ["username", "password"]
/// ```
///
/// Only `[tool]` is mandatory. This is the raw, unvalidated form; use
/// `ConfigFile::try_from` (or [`load_and_validate`](crate::config::load_and_validate))
/// to obtain typed settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub tool: ToolSection,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub normalizer: NormalizerSection,

    /// Optional action catalog, keyed by target name.
    #[serde(default)]
    pub target: BTreeMap<String, TargetSection>,
}

/// `[tool]` section: how to invoke the external automation tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSection {
    pub executable: String,
    pub inventory: String,
    pub playbook: String,

    #[serde(default)]
    pub vault_password_file: Option<String>,

    /// Env var that switches the tool to JSON output.
    #[serde(default = "default_structured_output_env")]
    pub structured_output_env: String,

    #[serde(default = "default_structured_output_value")]
    pub structured_output_value: String,

    /// Extra environment entries layered over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_structured_output_env() -> String {
    "ANSIBLE_STDOUT_CALLBACK".to_string()
}

fn default_structured_output_value() -> String {
    "json".to_string()
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_runner_timeout")]
    pub timeout: String,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
}

fn default_runner_timeout() -> String {
    "10m".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_kill_grace() -> String {
    "5s".to_string()
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            timeout: default_runner_timeout(),
            max_concurrent: default_max_concurrent(),
            kill_grace: default_kill_grace(),
        }
    }
}

/// `[stream]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// Longest gap allowed between two output lines.
    #[serde(default = "default_line_idle_timeout")]
    pub line_idle_timeout: String,

    /// Optional cap on the whole session.
    #[serde(default)]
    pub session_timeout: Option<String>,

    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
}

fn default_line_idle_timeout() -> String {
    "60s".to_string()
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            line_idle_timeout: default_line_idle_timeout(),
            session_timeout: None,
            kill_grace: default_kill_grace(),
        }
    }
}

/// `[metrics]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub store: MetricsStoreKind,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_metrics_path() -> String {
    "playgate-metrics.jsonl".to_string()
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            store: MetricsStoreKind::default(),
            path: default_metrics_path(),
        }
    }
}

/// `[normalizer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerSection {
    /// Regex matched against task names to find the display task.
    #[serde(default = "default_display_pattern")]
    pub display_pattern: String,

    #[serde(default = "default_unnamed_task")]
    pub unnamed_task: String,

    #[serde(default = "default_missing_reason")]
    pub missing_reason: String,
}

fn default_display_pattern() -> String {
    DEFAULT_DISPLAY_PATTERN.to_string()
}

fn default_unnamed_task() -> String {
    DEFAULT_UNNAMED_TASK.to_string()
}

fn default_missing_reason() -> String {
    DEFAULT_MISSING_REASON.to_string()
}

impl Default for NormalizerSection {
    fn default() -> Self {
        Self {
            display_pattern: default_display_pattern(),
            unnamed_task: default_unnamed_task(),
            missing_reason: default_missing_reason(),
        }
    }
}

/// `[target.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TargetSection {
    #[serde(default)]
    pub action: BTreeMap<String, ActionSection>,
}

/// `[target.<name>.action.<action>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActionSection {
    /// Payload keys that must be present and non-empty.
    #[serde(default)]
    pub required: Vec<String>,
}

/// Validated configuration.
///
/// Every component receives its own settings object from here at
/// construction time; nothing reads ambient process state afterwards.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub tool: ToolSettings,
    pub runner: RunnerSettings,
    pub stream: StreamSettings,
    pub metrics: MetricsSettings,
    pub normalizer: NormalizerSettings,
    pub catalog: ActionCatalog,
}

impl ConfigFile {
    /// Assemble a config without validation. Callers are expected to have
    /// gone through `TryFrom<RawConfigFile>`.
    pub(crate) fn new_unchecked(
        tool: ToolSettings,
        runner: RunnerSettings,
        stream: StreamSettings,
        metrics: MetricsSettings,
        normalizer: NormalizerSettings,
        catalog: ActionCatalog,
    ) -> Self {
        Self {
            tool,
            runner,
            stream,
            metrics,
            normalizer,
            catalog,
        }
    }
}

/// How the external tool is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub executable: PathBuf,
    pub inventory: PathBuf,
    pub playbook: PathBuf,
    pub vault_password_file: Option<PathBuf>,
    /// `(name, value)` of the env var forcing JSON output.
    pub structured_output_env: (String, String),
    pub env: BTreeMap<String, String>,
}

impl ToolSettings {
    /// Settings for `executable` with the conventional inventory/playbook
    /// locations and no vault file.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            inventory: PathBuf::from("inventory/hosts.ini"),
            playbook: PathBuf::from("playbook.yml"),
            vault_password_file: None,
            structured_output_env: (
                default_structured_output_env(),
                default_structured_output_value(),
            ),
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    pub timeout: Duration,
    pub max_concurrent: usize,
    /// How long to wait for output pipes to close after a forced kill.
    pub kill_grace: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            max_concurrent: default_max_concurrent(),
            kill_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub line_idle_timeout: Duration,
    pub session_timeout: Option<Duration>,
    pub kill_grace: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            line_idle_timeout: Duration::from_secs(60),
            session_timeout: None,
            kill_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSettings {
    pub store: MetricsStoreKind,
    pub path: PathBuf,
}

impl MetricsSettings {
    /// Anchor a relative ledger path at `root` (the config file's directory).
    pub fn resolve_relative_to(&mut self, root: &Path) {
        if self.path.is_relative() {
            self.path = root.join(&self.path);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerSettings {
    pub display_pattern: Regex,
    pub unnamed_task: String,
    pub missing_reason: String,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            display_pattern: Regex::new(DEFAULT_DISPLAY_PATTERN)
                .expect("default display pattern is a valid regex"),
            unnamed_task: DEFAULT_UNNAMED_TASK.to_string(),
            missing_reason: DEFAULT_MISSING_REASON.to_string(),
        }
    }
}
