// src/exec/runner.rs

//! Buffered (non-streaming) job execution.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RunnerSettings, ToolSettings};
use crate::exec::command::ToolInvocation;
use crate::exec::outcome::{ExecutionOutcome, SENTINEL_RETURN_CODE};
use crate::metrics::{MetricRecord, MetricsSink};
use crate::report::{ExecutionReport, Normalizer};
use crate::types::{ExecutionRequest, MetricOutcome};

enum Ended {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs the tool once per request, captures its output, normalizes the
/// report and records one metric per run.
#[derive(Debug, Clone)]
pub struct JobRunner {
    tool: Arc<ToolSettings>,
    normalizer: Arc<Normalizer>,
    metrics: MetricsSink,
    kill_grace: Duration,
}

impl JobRunner {
    pub fn new(tool: Arc<ToolSettings>, normalizer: Normalizer, metrics: MetricsSink) -> Self {
        Self {
            tool,
            normalizer: Arc::new(normalizer),
            metrics,
            kill_grace: RunnerSettings::default().kill_grace,
        }
    }

    /// Upper bound on draining output pipes after the process is gone.
    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    pub fn metrics(&self) -> &MetricsSink {
        &self.metrics
    }

    /// Run `request` to completion or until `timeout` elapses.
    pub async fn run(&self, request: &ExecutionRequest, timeout: Duration) -> ExecutionOutcome {
        self.run_with_cancel(request, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but `cancel` also terminates the process.
    pub async fn run_with_cancel(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let (outcome, elapsed) = self.execute(request, timeout, cancel).await;

        info!(
            target_name = %request.target(),
            action = %request.action(),
            return_code = outcome.return_code,
            kind = ?outcome.kind,
            duration_secs = elapsed.as_secs_f64(),
            "execution finished"
        );

        self.metrics.record(MetricRecord::new(
            request.target(),
            request.action(),
            MetricOutcome::from_return_code(outcome.return_code),
            elapsed,
        ));

        outcome
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> (ExecutionOutcome, Duration) {
        let invocation = ToolInvocation::structured(&self.tool, request);
        debug!(
            target_name = %request.target(),
            action = %request.action(),
            executable = %self.tool.executable.display(),
            "starting tool process"
        );

        let started = Instant::now();
        let mut child = match invocation.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    executable = %self.tool.executable.display(),
                    error = %e,
                    "failed to spawn tool process"
                );
                let message = format!(
                    "spawning '{}' failed: {e}",
                    self.tool.executable.display()
                );
                return (ExecutionOutcome::transport_failure(message), started.elapsed());
            }
        };

        // Pipes are drained while we wait; a full pipe would stall the child.
        let stdout_task = child.stdout.take().map(capture);
        let stderr_task = child.stderr.take().map(capture);

        let ended = tokio::select! {
            status = child.wait() => Ended::Exited(status),
            _ = tokio::time::sleep(timeout) => Ended::TimedOut,
            _ = cancel.cancelled() => Ended::Cancelled,
        };

        if !matches!(ended, Ended::Exited(_)) {
            info!(
                target_name = %request.target(),
                action = %request.action(),
                pid = ?child.id(),
                "terminating tool process"
            );
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill tool process");
            }
        }
        let elapsed = started.elapsed();

        let stdout = collect(stdout_task, self.kill_grace).await;
        let stderr = collect(stderr_task, self.kill_grace).await;

        let outcome = match ended {
            Ended::Exited(Ok(status)) => {
                let code = status.code().unwrap_or(SENTINEL_RETURN_CODE);
                self.interpret(code, stdout, stderr)
            }
            Ended::Exited(Err(e)) => {
                error!(error = %e, "failed to wait for tool process");
                ExecutionOutcome::transport_failure(format!("waiting for tool process failed: {e}"))
            }
            Ended::TimedOut => {
                warn!(
                    target_name = %request.target(),
                    action = %request.action(),
                    timeout_secs = timeout.as_secs_f64(),
                    "tool process timed out"
                );
                ExecutionOutcome::timed_out(timeout, stdout, stderr)
            }
            Ended::Cancelled => ExecutionOutcome::cancelled(stdout, stderr),
        };

        (outcome, elapsed)
    }

    fn interpret(&self, return_code: i32, stdout: String, stderr: String) -> ExecutionOutcome {
        match ExecutionReport::from_json_str(&stdout) {
            Ok(report) => {
                ExecutionOutcome::parsed(return_code, self.normalizer.normalize(&report), stderr)
            }
            Err(e) => {
                warn!(return_code, error = %e, "tool output is not a structured report");
                ExecutionOutcome::unparsable(return_code, stdout, stderr)
            }
        }
    }
}

/// Output read from one pipe so far, shared with the task reading it.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl Capture {
    fn take(&self) -> String {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned()
    }
}

fn capture<R>(mut pipe: R) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let task = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            let n = pipe.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]);
        }
    });
    Capture { buf, task }
}

/// Whatever a capture task read, waiting at most `grace` for the pipe to
/// close. A grandchild can keep a pipe open after the tool itself is gone;
/// the bytes read before the grace ran out are still returned.
async fn collect(capture: Option<Capture>, grace: Duration) -> String {
    let Some(mut capture) = capture else {
        return String::new();
    };
    match tokio::time::timeout(grace, &mut capture.task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "reading tool output failed"),
        Ok(Err(e)) => warn!(error = %e, "output capture task failed"),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "output pipe still open after grace period; keeping what was read"
            );
            capture.task.abort();
        }
    }
    capture.take()
}
