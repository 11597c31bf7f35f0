// tests/dispatcher.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use playgate::config::{RunnerSettings, ToolSettings};
use playgate::exec::{Dispatcher, JobRunner, OutcomeKind};
use playgate::report::Normalizer;
use playgate::types::{ExecutionRequest, Payload};
use playgate_test_utils::{init_tracing, memory_sink, with_timeout, FakeTool};
use serde_json::json;

fn request(i: usize) -> ExecutionRequest {
    let mut payload = Payload::new();
    payload.insert("username".into(), json!(format!("user{i}")));
    ExecutionRequest::new("user", "create", payload)
}

#[tokio::test]
async fn concurrency_is_bounded_by_max_concurrent() {
    init_tracing();
    let fake = FakeTool::new();
    // Each run appends its start and end to a shared log so overlap can be
    // reconstructed afterwards.
    let log = fake.dir().join("overlap.log");
    let exe = fake.script(
        "slow-tool",
        &format!(
            "echo start >> '{log}'\nsleep 0.3\necho end >> '{log}'\necho '{{\"plays\": [], \"stats\": {{}}}}'",
            log = log.display()
        ),
    );
    let (sink, store) = memory_sink();
    let runner = JobRunner::new(Arc::new(ToolSettings::new(&exe)), Normalizer::default(), sink.clone());
    let dispatcher = Dispatcher::new(
        runner,
        RunnerSettings {
            timeout: Duration::from_secs(5),
            max_concurrent: 2,
            kill_grace: Duration::from_secs(1),
        },
    );

    let started = Instant::now();
    let mut set = dispatcher.dispatch_all((0..4).map(request));
    let mut finished = Vec::new();
    while let Some(joined) = with_timeout(set.join_next()).await {
        let (req, outcome) = joined.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Success);
        finished.push(req.payload()["username"].clone());
    }
    let elapsed = started.elapsed();

    assert_eq!(finished.len(), 4);
    // Four 0.3s jobs two at a time take at least two rounds.
    assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");

    let mut running = 0i32;
    let mut peak = 0i32;
    for line in std::fs::read_to_string(&log).unwrap().lines() {
        running += if line == "start" { 1 } else { -1 };
        peak = peak.max(running);
    }
    assert_eq!(peak, 2);

    sink.flush().await;
    assert_eq!(store.records().len(), 4);
}

#[tokio::test]
async fn single_dispatch_returns_request_with_outcome() {
    init_tracing();
    let fake = FakeTool::new();
    let exe = fake.printing_lines(&["not a report"], 0, 4);
    let (sink, _store) = memory_sink();
    let runner = JobRunner::new(Arc::new(ToolSettings::new(&exe)), Normalizer::default(), sink);
    let dispatcher = Dispatcher::new(runner, RunnerSettings::default());

    let (req, outcome) = with_timeout(dispatcher.dispatch(request(7))).await.unwrap();

    assert_eq!(req, request(7));
    assert_eq!(outcome.return_code, 4);
    assert_eq!(outcome.kind, OutcomeKind::UnparsableOutput);
    assert_eq!(outcome.raw_stdout.as_deref(), Some("not a report\n"));
}
