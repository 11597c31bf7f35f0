// src/report/model.rs

//! Typed view of the tool's JSON execution report.
//!
//! Only the fields the normalizer reads are modelled; everything else in the
//! report is ignored. Every field has a default so a sparse report still
//! deserialises.

use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregate counters of the run (`ok`, `changed`, `failures`, ... per host).
pub type Stats = Map<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionReport {
    #[serde(default)]
    pub stats: Stats,

    #[serde(default)]
    pub plays: Vec<PlayRecord>,
}

impl ExecutionReport {
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// All `(task, host result)` pairs in report order.
    pub fn host_results(&self) -> impl Iterator<Item = (&TaskRecord, &HostResult)> {
        self.plays
            .iter()
            .flat_map(|play| play.tasks.iter())
            .flat_map(|task| task.hosts.iter().map(move |host| (task, host)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayRecord {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub task: TaskHeader,

    /// Per-host results, in the order the report lists them.
    #[serde(default, deserialize_with = "hosts_in_order")]
    pub hosts: Vec<HostResult>,
}

impl TaskRecord {
    /// Declared task name, `None` when missing or blank.
    pub fn name(&self) -> Option<&str> {
        self.task
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskHeader {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostResult {
    pub host: String,
    pub failed: bool,
    pub msg: Option<Value>,
}

impl HostResult {
    /// Message, if it carries anything worth showing.
    pub fn message(&self) -> Option<&Value> {
        self.msg.as_ref().filter(|msg| is_truthy(msg))
    }
}

#[derive(Deserialize)]
struct HostFields {
    #[serde(default)]
    failed: Option<Value>,
    #[serde(default)]
    msg: Option<Value>,
}

/// JSON truthiness: null, false, 0, "" and empty containers are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Deserialise the `hosts` object into a list that keeps document order.
fn hosts_in_order<'de, D>(deserializer: D) -> Result<Vec<HostResult>, D::Error>
where
    D: Deserializer<'de>,
{
    struct HostsVisitor;

    impl<'de> Visitor<'de> for HostsVisitor {
        type Value = Vec<HostResult>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of host name to host result")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut hosts = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((host, fields)) = map.next_entry::<String, HostFields>()? {
                hosts.push(HostResult {
                    host,
                    failed: fields.failed.as_ref().is_some_and(is_truthy),
                    msg: fields.msg,
                });
            }
            Ok(hosts)
        }
    }

    deserializer.deserialize_map(HostsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_host_order_and_defaults() {
        let report = ExecutionReport::from_json_str(
            r#"{
                "plays": [{"tasks": [{
                    "task": {"name": "Gather"},
                    "hosts": {
                        "web2": {"changed": false},
                        "web1": {"failed": true, "msg": "boom"}
                    }
                }]}]
            }"#,
        )
        .unwrap();

        assert!(report.stats.is_empty());
        let hosts: Vec<_> = report.host_results().map(|(_, h)| h.host.as_str()).collect();
        assert_eq!(hosts, vec!["web2", "web1"]);

        let (_, second) = report.host_results().nth(1).unwrap();
        assert!(second.failed);
        assert_eq!(second.message(), Some(&Value::from("boom")));
    }

    #[test]
    fn blank_task_name_counts_as_unnamed() {
        let report = ExecutionReport::from_json_str(
            r#"{"plays": [{"tasks": [{"task": {"name": "  "}, "hosts": {}}]}]}"#,
        )
        .unwrap();
        assert_eq!(report.plays[0].tasks[0].name(), None);
    }

    #[test]
    fn empty_message_is_not_a_message() {
        let host = HostResult {
            host: "h".into(),
            failed: false,
            msg: Some(Value::from("")),
        };
        assert!(host.message().is_none());
    }

    #[test]
    fn non_object_stdout_is_rejected() {
        assert!(ExecutionReport::from_json_str("\"just a string\"").is_err());
        assert!(ExecutionReport::from_json_str("PLAY [all] ****").is_err());
    }
}
