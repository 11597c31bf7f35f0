// tests/job_runner.rs

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use playgate::config::ToolSettings;
use playgate::exec::outcome::TIMEOUT_MARKER;
use playgate::exec::{JobRunner, OutcomeKind, SENTINEL_RETURN_CODE};
use playgate::metrics::{MetricsSink, MetricsStore};
use playgate::report::{NormalizedResult, Normalizer};
use playgate::types::{ExecutionRequest, MetricOutcome, Payload};
use playgate_test_utils::{
    init_tracing, memory_sink, process_alive, with_timeout, FailingStore, FakeTool, ReportBuilder,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn runner(executable: &Path, sink: MetricsSink) -> JobRunner {
    JobRunner::new(
        Arc::new(ToolSettings::new(executable)),
        Normalizer::default(),
        sink,
    )
    .with_kill_grace(Duration::from_secs(2))
}

fn list_users() -> ExecutionRequest {
    ExecutionRequest::new("user", "list_users", Payload::new())
}

fn create_site() -> ExecutionRequest {
    let mut payload = Payload::new();
    payload.insert("server_name".into(), json!("example.com"));
    ExecutionRequest::new("webserver", "create", payload)
}

#[tokio::test]
async fn successful_run_returns_display_results_and_records_success() {
    init_tracing();
    let fake = FakeTool::new();
    let report = ReportBuilder::new()
        .stats("srv1", 2, 0)
        .ok_task("Read accounts")
        .display_task("Afficher les utilisateurs", r#"{"users": ["alice","bob"]}"#)
        .to_json();
    let exe = fake.reporting(&report, "", 0);
    let (sink, store) = memory_sink();

    let outcome = with_timeout(runner(&exe, sink.clone()).run(&list_users(), Duration::from_secs(5))).await;

    assert_eq!(outcome.return_code, 0);
    assert_eq!(outcome.kind, OutcomeKind::Success);
    assert!(outcome.succeeded());
    assert_eq!(outcome.http_status(), 200);
    assert!(outcome.raw_stdout.is_none());
    let normalized = outcome.normalized.expect("report parsed");
    assert_eq!(normalized.results(), Some(&[json!("alice"), json!("bob")][..]));

    sink.flush().await;
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target, "user");
    assert_eq!(records[0].action, "list_users");
    assert_eq!(records[0].outcome, MetricOutcome::Success);
    assert!(records[0].duration_seconds >= 0.0);
}

#[tokio::test]
async fn in_band_failure_with_exit_zero_is_labeled_success_in_metrics() {
    init_tracing();
    let fake = FakeTool::new();
    let report = ReportBuilder::new()
        .stats("web1", 1, 1)
        .failed_task("Ensure root directory exists", "Permission denied")
        .to_json();
    let exe = fake.reporting(&report, "", 0);
    let (sink, store) = memory_sink();

    let outcome = with_timeout(runner(&exe, sink.clone()).run(&create_site(), Duration::from_secs(5))).await;

    assert_eq!(outcome.return_code, 0);
    assert_eq!(outcome.kind, OutcomeKind::InBandFailure);
    assert!(!outcome.succeeded());
    assert_eq!(outcome.http_status(), 500);
    match outcome.normalized {
        Some(NormalizedResult::Failure {
            failed_task,
            reason,
            ..
        }) => {
            assert_eq!(failed_task, "Ensure root directory exists");
            assert_eq!(reason, "Permission denied");
        }
        other => panic!("expected in-band failure, got {other:?}"),
    }

    // Metric labels follow the exit code only.
    sink.flush().await;
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, MetricOutcome::Success);
}

#[tokio::test]
async fn in_band_failure_with_nonzero_exit_is_labeled_failure() {
    init_tracing();
    let fake = FakeTool::new();
    let report = ReportBuilder::new()
        .failed_task("Ensure root directory exists", "Permission denied")
        .to_json();
    let exe = fake.reporting(&report, "fatal: task failed", 2);
    let (sink, store) = memory_sink();

    let outcome = with_timeout(runner(&exe, sink.clone()).run(&create_site(), Duration::from_secs(5))).await;

    assert_eq!(outcome.return_code, 2);
    assert_eq!(outcome.kind, OutcomeKind::InBandFailure);
    assert_eq!(outcome.stderr, "fatal: task failed");

    sink.flush().await;
    assert_eq!(store.records()[0].outcome, MetricOutcome::Failure);
}

#[tokio::test]
async fn non_json_stdout_is_preserved_raw() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.script(
        "crashing-tool",
        "echo 'ERROR! the playbook could not be found'\necho 'Traceback: boom' >&2\nexit 1",
    );
    let (sink, store) = memory_sink();

    let outcome = with_timeout(runner(&exe, sink.clone()).run(&list_users(), Duration::from_secs(5))).await;

    assert_eq!(outcome.return_code, 1);
    assert_eq!(outcome.kind, OutcomeKind::UnparsableOutput);
    assert!(outcome.normalized.is_none());
    assert_eq!(
        outcome.raw_stdout.as_deref(),
        Some("ERROR! the playbook could not be found\n")
    );
    assert!(outcome.stderr.contains("Traceback: boom"));

    sink.flush().await;
    assert_eq!(store.records()[0].outcome, MetricOutcome::Failure);
}

#[tokio::test]
async fn timeout_kills_the_process_and_records_one_failure() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.hanging("PLAY [all] ****");
    let (sink, store) = memory_sink();

    let outcome = with_timeout(
        runner(&exe, sink.clone()).run(&list_users(), Duration::from_millis(500)),
    )
    .await;

    assert_eq!(outcome.kind, OutcomeKind::Timeout);
    assert_eq!(outcome.return_code, SENTINEL_RETURN_CODE);
    assert!(outcome.normalized.is_none());
    assert!(outcome.stderr.contains(TIMEOUT_MARKER));
    assert_eq!(outcome.raw_stdout.as_deref(), Some("PLAY [all] ****\n"));

    let pid = fake.wait_for_pid().await;
    assert!(!process_alive(pid), "tool process {pid} survived the timeout");

    sink.flush().await;
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, MetricOutcome::Failure);
    assert!(records[0].duration_seconds >= 0.5);
}

#[tokio::test]
async fn missing_executable_is_a_transport_failure() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.missing();
    let (sink, store) = memory_sink();

    let outcome = with_timeout(runner(&exe, sink.clone()).run(&list_users(), Duration::from_secs(5))).await;

    assert_eq!(outcome.kind, OutcomeKind::Transport);
    assert_eq!(outcome.return_code, SENTINEL_RETURN_CODE);
    assert!(outcome.normalized.is_none());
    assert!(outcome.stderr.contains("no-such-tool"));

    sink.flush().await;
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, MetricOutcome::Failure);
}

#[tokio::test]
async fn cancellation_terminates_the_process() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.hanging("PLAY [all] ****");
    let (sink, store) = memory_sink();
    let runner = runner(&exe, sink.clone());
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            runner
                .run_with_cancel(&list_users(), Duration::from_secs(30), &cancel)
                .await
        })
    };

    let pid = with_timeout(fake.wait_for_pid()).await;
    cancel.cancel();
    let outcome = with_timeout(task).await.unwrap();

    assert_eq!(outcome.kind, OutcomeKind::Cancelled);
    assert_eq!(outcome.return_code, SENTINEL_RETURN_CODE);
    assert!(!process_alive(pid));

    sink.flush().await;
    assert_eq!(store.records().len(), 1);
}

#[tokio::test]
async fn failing_metrics_store_does_not_affect_the_caller() {
    init_tracing();
    let fake = FakeTool::new();
    let report = ReportBuilder::new().ok_task("Create user").to_json();
    let exe = fake.reporting(&report, "", 0);
    let store = Arc::new(FailingStore::new());
    let sink = MetricsSink::spawn(store.clone());

    let outcome = with_timeout(runner(&exe, sink.clone()).run(&list_users(), Duration::from_secs(5))).await;

    assert!(outcome.succeeded());
    sink.flush().await;
    assert_eq!(store.attempts(), 1);
    assert!(store.load().is_err());
}

#[tokio::test]
async fn tool_receives_request_as_extra_vars_in_structured_mode() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.recording();
    let (sink, _store) = memory_sink();

    let outcome = with_timeout(runner(&exe, sink).run(&create_site(), Duration::from_secs(5))).await;
    assert_eq!(outcome.kind, OutcomeKind::Success);

    assert_eq!(
        fake.recorded_args(),
        vec![
            "-i",
            "inventory/hosts.ini",
            "playbook.yml",
            "--extra-vars",
            r#"{"target":"webserver","action":"create","payload":{"server_name":"example.com"}}"#,
        ]
    );
    assert_eq!(fake.recorded_env(), "json");
}

#[tokio::test]
async fn concurrent_runs_do_not_block_each_other() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.script(
        "slow-tool",
        "sleep 0.4\necho '{\"plays\": [], \"stats\": {}}'",
    );
    let (sink, store) = memory_sink();
    let runner = Arc::new(runner(&exe, sink.clone()));

    let started = std::time::Instant::now();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run(&list_users(), Duration::from_secs(5)).await })
        })
        .collect();
    for handle in handles {
        assert!(with_timeout(handle).await.unwrap().succeeded());
    }

    assert!(started.elapsed() < Duration::from_millis(1500));
    sink.flush().await;
    assert_eq!(store.records().len(), 4);
}

#[tokio::test]
async fn report_is_kept_when_a_grandchild_holds_stdout_open() {
    init_tracing();
    let fake = FakeTool::new();
    let report = ReportBuilder::new()
        .stats("srv1", 1, 0)
        .display_task("Afficher les utilisateurs", r#"{"users": ["alice"]}"#)
        .to_json();
    let exe = fake.reporting_with_lingering_child(&report);
    let (sink, _store) = memory_sink();
    let runner = runner(&exe, sink).with_kill_grace(Duration::from_millis(300));

    let outcome = with_timeout(runner.run(&list_users(), Duration::from_secs(5))).await;

    let lingering = fake.wait_for_pid().await;
    std::process::Command::new("kill")
        .arg(lingering.to_string())
        .status()
        .unwrap();

    assert_eq!(outcome.return_code, 0);
    assert_eq!(outcome.kind, OutcomeKind::Success);
    let normalized = outcome.normalized.expect("report captured before grace expired");
    assert_eq!(normalized.results(), Some(&[json!("alice")][..]));
}
