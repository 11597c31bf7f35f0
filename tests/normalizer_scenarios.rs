// tests/normalizer_scenarios.rs

use playgate::report::{normalize, ExecutionReport, NormalizedResult};
use playgate_test_utils::ReportBuilder;
use serde_json::json;

fn parse(report: String) -> ExecutionReport {
    ExecutionReport::from_json_str(&report).expect("builder produces a valid report")
}

#[test]
fn list_users_display_task_yields_user_names() {
    let report = ReportBuilder::new()
        .stats("srv1", 3, 0)
        .ok_task("Gather facts")
        .ok_task("Read /etc/passwd")
        .display_task("Afficher les utilisateurs", r#"{"users": ["alice","bob"]}"#)
        .to_json();

    let result = normalize(&parse(report));

    assert!(result.is_success());
    assert_eq!(result.results(), Some(&[json!("alice"), json!("bob")][..]));
    assert_eq!(result.stats()["srv1"]["ok"], json!(3));
}

#[test]
fn webserver_create_failure_reports_task_and_reason() {
    let report = ReportBuilder::new()
        .stats("web1", 1, 1)
        .ok_task("Install nginx")
        .failed_task("Ensure root directory exists", "Permission denied")
        .to_json();

    let result = normalize(&parse(report));

    match &result {
        NormalizedResult::Failure {
            failed_task,
            reason,
            ..
        } => {
            assert_eq!(failed_task, "Ensure root directory exists");
            assert_eq!(reason, "Permission denied");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["failed_task"], json!("Ensure root directory exists"));
    assert_eq!(wire["reason"], json!("Permission denied"));
    assert!(wire.get("results").is_none());
}

#[test]
fn first_failed_host_wins_across_hosts() {
    let report = ReportBuilder::new()
        .task_on_hosts(
            "Open firewall port",
            &[
                ("web1", json!({"changed": true})),
                ("web2", json!({"failed": true, "msg": "firewalld not running"})),
                ("web3", json!({"failed": true, "msg": "permission denied"})),
            ],
        )
        .failed_task("Reload nginx", "never reached")
        .to_json();

    match normalize(&parse(report)) {
        NormalizedResult::Failure {
            failed_task,
            reason,
            ..
        } => {
            assert_eq!(failed_task, "Open firewall port");
            assert_eq!(reason, "firewalld not running");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn unnamed_failed_task_without_message_uses_placeholders() {
    let report = ReportBuilder::new()
        .unnamed_failed_task(serde_json::Value::Null)
        .to_json();

    match normalize(&parse(report)) {
        NormalizedResult::Failure {
            failed_task,
            reason,
            ..
        } => {
            assert_eq!(failed_task, "unknown task");
            assert_eq!(reason, "no detailed error message found");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn structured_failure_message_is_rendered_as_json_text() {
    let report = ReportBuilder::new()
        .failed_task("Create database", json!({"rc": 1, "stderr": "exists"}))
        .to_json();

    match normalize(&parse(report)) {
        NormalizedResult::Failure { reason, .. } => {
            assert_eq!(reason, r#"{"rc":1,"stderr":"exists"}"#);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn first_display_task_with_a_message_is_used() {
    let report = ReportBuilder::new()
        .display_task("Afficher rien", "")
        .display_task("Afficher les sites", "Sites: ['a.example', 'b.example']")
        .display_task("Afficher encore", "[\"ignored\"]")
        .to_json();

    let result = normalize(&parse(report));
    assert_eq!(
        result.results(),
        Some(&[json!("a.example"), json!("b.example")][..])
    );
}

#[test]
fn malformed_display_message_falls_back_to_raw_text() {
    let report = ReportBuilder::new()
        .display_task("Afficher la config", "listen: [80, 443")
        .to_json();

    let result = normalize(&parse(report));
    assert_eq!(result.results(), Some(&[json!("listen: [80, 443")][..]));
}

#[test]
fn report_without_display_task_has_empty_results() {
    let report = ReportBuilder::new()
        .stats("srv1", 2, 0)
        .ok_task("Create user")
        .ok_task("Add to group")
        .to_json();

    let result = normalize(&parse(report));
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "stats": {"srv1": {"ok": 2, "changed": 0, "failures": 0, "unreachable": 0, "skipped": 0}},
            "results": []
        })
    );
}

#[test]
fn sparse_report_still_normalizes() {
    let report = ExecutionReport::from_json_str(r#"{"plays": [{"tasks": [{}]}]}"#).unwrap();
    let result = normalize(&report);
    assert!(result.is_success());
    assert!(result.stats().is_empty());
}
