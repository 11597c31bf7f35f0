#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use playgate::config::model::{
    ActionSection, MetricsSection, NormalizerSection, RunnerSection, StreamSection,
    TargetSection, ToolSection,
};
use playgate::config::{ConfigFile, RawConfigFile};
use playgate::types::MetricsStoreKind;
use serde_json::{json, Map, Value};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Goes through the same validation as a loaded TOML file.
pub struct SettingsBuilder {
    config: RawConfigFile,
}

impl SettingsBuilder {
    pub fn new(executable: &Path) -> Self {
        Self {
            config: RawConfigFile {
                tool: ToolSection {
                    executable: executable.display().to_string(),
                    inventory: "inventory/hosts.ini".to_string(),
                    playbook: "playbook.yml".to_string(),
                    vault_password_file: None,
                    structured_output_env: "ANSIBLE_STDOUT_CALLBACK".to_string(),
                    structured_output_value: "json".to_string(),
                    env: BTreeMap::new(),
                },
                runner: RunnerSection::default(),
                stream: StreamSection::default(),
                metrics: MetricsSection {
                    store: MetricsStoreKind::Memory,
                    ..MetricsSection::default()
                },
                normalizer: NormalizerSection::default(),
                target: BTreeMap::new(),
            },
        }
    }

    pub fn with_timeout(mut self, timeout: &str) -> Self {
        self.config.runner.timeout = timeout.to_string();
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.config.runner.max_concurrent = n;
        self
    }

    pub fn with_kill_grace(mut self, grace: &str) -> Self {
        self.config.runner.kill_grace = grace.to_string();
        self.config.stream.kill_grace = grace.to_string();
        self
    }

    pub fn with_line_idle_timeout(mut self, idle: &str) -> Self {
        self.config.stream.line_idle_timeout = idle.to_string();
        self
    }

    pub fn with_session_timeout(mut self, limit: &str) -> Self {
        self.config.stream.session_timeout = Some(limit.to_string());
        self
    }

    pub fn with_vault_password_file(mut self, path: &str) -> Self {
        self.config.tool.vault_password_file = Some(path.to_string());
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .tool
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_display_pattern(mut self, pattern: &str) -> Self {
        self.config.normalizer.display_pattern = pattern.to_string();
        self
    }

    pub fn with_action(mut self, target: &str, action: &str, required: &[&str]) -> Self {
        self.config
            .target
            .entry(target.to_string())
            .or_insert_with(TargetSection::default)
            .action
            .insert(
                action.to_string(),
                ActionSection {
                    required: required.iter().map(|s| s.to_string()).collect(),
                },
            );
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for the tool's JSON execution report.
///
/// Tasks are appended to a single play; each task carries one result for
/// the current host (default `localhost`).
pub struct ReportBuilder {
    stats: Map<String, Value>,
    tasks: Vec<Value>,
    host: String,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            stats: Map::new(),
            tasks: Vec::new(),
            host: "localhost".to_string(),
        }
    }

    /// Host the following tasks report for.
    pub fn on_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn stats(mut self, host: &str, ok: u64, failures: u64) -> Self {
        self.stats.insert(
            host.to_string(),
            json!({ "ok": ok, "changed": 0, "failures": failures, "unreachable": 0, "skipped": 0 }),
        );
        self
    }

    /// A task with an arbitrary per-host result object.
    pub fn task(mut self, name: &str, result: Value) -> Self {
        let mut hosts = Map::new();
        hosts.insert(self.host.clone(), result);
        self.tasks.push(json!({
            "task": { "name": name },
            "hosts": hosts,
        }));
        self
    }

    /// A task whose results list several hosts, in the given order.
    pub fn task_on_hosts(mut self, name: &str, results: &[(&str, Value)]) -> Self {
        let hosts: Map<String, Value> = results
            .iter()
            .map(|(host, result)| (host.to_string(), result.clone()))
            .collect();
        self.tasks.push(json!({
            "task": { "name": name },
            "hosts": hosts,
        }));
        self
    }

    pub fn ok_task(self, name: &str) -> Self {
        self.task(name, json!({ "changed": false }))
    }

    pub fn display_task(self, name: &str, msg: impl Into<Value>) -> Self {
        let msg: Value = msg.into();
        self.task(name, json!({ "changed": false, "msg": msg }))
    }

    pub fn failed_task(self, name: &str, msg: impl Into<Value>) -> Self {
        let msg: Value = msg.into();
        self.task(name, json!({ "failed": true, "msg": msg }))
    }

    /// A failed task whose header carries no name.
    pub fn unnamed_failed_task(mut self, msg: impl Into<Value>) -> Self {
        let msg: Value = msg.into();
        let mut hosts = Map::new();
        hosts.insert(self.host.clone(), json!({ "failed": true, "msg": msg }));
        self.tasks.push(json!({ "task": {}, "hosts": hosts }));
        self
    }

    pub fn build(self) -> Value {
        json!({
            "plays": [{ "play": { "name": "playgate" }, "tasks": self.tasks }],
            "stats": self.stats,
        })
    }

    pub fn to_json(self) -> String {
        self.build().to_string()
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
