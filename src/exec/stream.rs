// src/exec/stream.rs

//! Streaming execution: forward the tool's human-readable output line by
//! line to a connected client.
//!
//! A session accepts exactly one request. Its lifecycle is
//!
//! ```text
//! AwaitingRequest -> Running -> Completed | Failed | Cancelled
//! ```
//!
//! and every terminal state is final. The client sees a
//! [`StreamLine::Started`] acknowledgment, one [`StreamLine::Output`] per
//! tool line, then [`StreamLine::Finished`] or [`StreamLine::Error`]. A
//! client that goes away (dropping [`SessionLines`]) or a fired
//! cancellation token ends the session as `Cancelled` and the tool process
//! is killed within the configured grace period.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{StreamSettings, ToolSettings};
use crate::exec::command::ToolInvocation;
use crate::exec::outcome::SENTINEL_RETURN_CODE;
use crate::metrics::{MetricRecord, MetricsSink};
use crate::types::{ExecutionRequest, MetricOutcome};

/// Lines buffered between the session and a slow client.
const LINE_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

/// One line sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    /// Acknowledgment carrying the rendered command line.
    Started(String),
    /// A line of tool output, without its trailing newline.
    Output(String),
    /// The tool exited with this code.
    Finished(i32),
    Error(String),
}

impl StreamLine {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamLine::Finished(_) | StreamLine::Error(_))
    }
}

impl fmt::Display for StreamLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamLine::Started(cmd) => write!(f, "INFO: launching command: {cmd}"),
            StreamLine::Output(line) => f.write_str(line),
            StreamLine::Finished(code) => {
                write!(f, "INFO: playbook execution finished (exit code {code})")
            }
            StreamLine::Error(reason) => write!(f, "ERROR: {reason}"),
        }
    }
}

/// Client side of a session's output.
#[derive(Debug)]
pub struct SessionLines {
    rx: mpsc::Receiver<StreamLine>,
}

impl SessionLines {
    /// Next line, or `None` once the session is over.
    pub async fn next(&mut self) -> Option<StreamLine> {
        self.rx.recv().await
    }
}

/// Observer for a running session.
#[derive(Debug)]
pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionState>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait for the session to reach a terminal state.
    pub async fn wait(self) -> SessionState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "streaming session task failed");
                SessionState::Failed
            }
        }
    }
}

/// A not-yet-opened streaming session.
#[derive(Debug)]
pub struct StreamingSession {
    tool: Arc<ToolSettings>,
    settings: StreamSettings,
    metrics: MetricsSink,
    state: watch::Sender<SessionState>,
}

impl StreamingSession {
    pub fn new(tool: Arc<ToolSettings>, settings: StreamSettings, metrics: MetricsSink) -> Self {
        let (state, _) = watch::channel(SessionState::AwaitingRequest);
        Self {
            tool,
            settings,
            metrics,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Decode the client's single request message and open the session.
    ///
    /// A message that does not decode ends the session as `Failed` with an
    /// error line; no process is started and no metric is recorded.
    pub fn open_json(self, message: &str, cancel: CancellationToken) -> (SessionLines, SessionHandle) {
        match ExecutionRequest::from_json_str(message) {
            Ok(request) => self.open(request, cancel),
            Err(e) => {
                warn!(error = %e, "rejecting malformed streaming request");
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(StreamLine::Error(format!("invalid request: {e}")));
                self.state.send_replace(SessionState::Failed);
                let handle = SessionHandle {
                    state: self.state.subscribe(),
                    task: tokio::spawn(async { SessionState::Failed }),
                };
                (SessionLines { rx }, handle)
            }
        }
    }

    /// Start executing `request`. Must be called inside a Tokio runtime.
    pub fn open(
        self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> (SessionLines, SessionHandle) {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let state = self.state.subscribe();
        self.state.send_replace(SessionState::Running);
        let task = tokio::spawn(self.drive(request, tx, cancel));
        (SessionLines { rx }, SessionHandle { state, task })
    }

    async fn drive(
        self,
        request: ExecutionRequest,
        tx: mpsc::Sender<StreamLine>,
        cancel: CancellationToken,
    ) -> SessionState {
        info!(
            target_name = %request.target(),
            action = %request.action(),
            "streaming session started"
        );
        let started = Instant::now();
        let (state, exit_code) = self.stream(&request, &tx, &cancel).await;
        let elapsed = started.elapsed();

        self.state.send_replace(state);
        info!(
            target_name = %request.target(),
            action = %request.action(),
            state = ?state,
            exit_code,
            duration_secs = elapsed.as_secs_f64(),
            "streaming session finished"
        );

        let outcome = match state {
            SessionState::Completed => MetricOutcome::from_return_code(exit_code),
            _ => MetricOutcome::Failure,
        };
        self.metrics.record(MetricRecord::new(
            request.target(),
            request.action(),
            outcome,
            elapsed,
        ));
        state
    }

    /// Returns the terminal state and the exit code (sentinel unless
    /// `Completed`).
    async fn stream(
        &self,
        request: &ExecutionRequest,
        tx: &mpsc::Sender<StreamLine>,
        cancel: &CancellationToken,
    ) -> (SessionState, i32) {
        let invocation = ToolInvocation::passthrough(&self.tool, request);
        let idle = self.settings.line_idle_timeout;
        match forward(tx, StreamLine::Started(invocation.render()), cancel, idle).await {
            Delivery::Sent => {}
            Delivery::Gone => return (SessionState::Cancelled, SENTINEL_RETURN_CODE),
            Delivery::Stalled | Delivery::Expired => {
                return (SessionState::Failed, SENTINEL_RETURN_CODE);
            }
        }

        let mut child = match invocation.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn tool process for streaming session");
                let reason = format!(
                    "failed to launch '{}': {e}",
                    self.tool.executable.display()
                );
                forward(tx, StreamLine::Error(reason), cancel, idle).await;
                return (SessionState::Failed, SENTINEL_RETURN_CODE);
            }
        };

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("tool stderr: {}", line);
                }
            });
        }

        let Some(stdout) = child.stdout.take() else {
            self.terminate(&mut child).await;
            forward(tx, StreamLine::Error("tool stdout unavailable".into()), cancel, idle).await;
            return (SessionState::Failed, SENTINEL_RETURN_CODE);
        };
        let mut lines = BufReader::new(stdout).lines();

        let session_deadline = async {
            match self.settings.session_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(session_deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("streaming session cancelled; killing tool process");
                    self.terminate(&mut child).await;
                    return (SessionState::Cancelled, SENTINEL_RETURN_CODE);
                }
                _ = tx.closed() => {
                    info!("streaming client disconnected; killing tool process");
                    self.terminate(&mut child).await;
                    return (SessionState::Cancelled, SENTINEL_RETURN_CODE);
                }
                _ = &mut session_deadline => {
                    self.terminate(&mut child).await;
                    let reason = "session time limit exceeded".to_string();
                    forward(tx, StreamLine::Error(reason), cancel, idle).await;
                    return (SessionState::Failed, SENTINEL_RETURN_CODE);
                }
                next = tokio::time::timeout(idle, lines.next_line()) => match next {
                    Ok(Ok(Some(line))) => {
                        let sent = tokio::select! {
                            delivery = forward(tx, StreamLine::Output(line), cancel, idle) => delivery,
                            _ = &mut session_deadline => Delivery::Expired,
                        };
                        match sent {
                            Delivery::Sent => {}
                            Delivery::Gone => {
                                self.terminate(&mut child).await;
                                return (SessionState::Cancelled, SENTINEL_RETURN_CODE);
                            }
                            Delivery::Stalled => {
                                warn!(idle_secs = idle.as_secs_f64(), "streaming client stopped reading");
                                self.terminate(&mut child).await;
                                let reason = format!("client did not read output for {:.3}s", idle.as_secs_f64());
                                let _ = tx.try_send(StreamLine::Error(reason));
                                return (SessionState::Failed, SENTINEL_RETURN_CODE);
                            }
                            Delivery::Expired => {
                                warn!("session time limit reached while client was not reading");
                                self.terminate(&mut child).await;
                                let _ = tx.try_send(StreamLine::Error("session time limit exceeded".into()));
                                return (SessionState::Failed, SENTINEL_RETURN_CODE);
                            }
                        }
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        self.terminate(&mut child).await;
                        forward(tx, StreamLine::Error(format!("reading tool output failed: {e}")), cancel, idle).await;
                        return (SessionState::Failed, SENTINEL_RETURN_CODE);
                    }
                    Err(_) => {
                        warn!(idle_secs = idle.as_secs_f64(), "no output from tool process");
                        self.terminate(&mut child).await;
                        let reason = format!("no output for {:.3}s", idle.as_secs_f64());
                        forward(tx, StreamLine::Error(reason), cancel, idle).await;
                        return (SessionState::Failed, SENTINEL_RETURN_CODE);
                    }
                },
            }
        }

        // Stdout is closed; the process should be exiting.
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                self.terminate(&mut child).await;
                return (SessionState::Cancelled, SENTINEL_RETURN_CODE);
            }
            _ = tx.closed() => {
                self.terminate(&mut child).await;
                return (SessionState::Cancelled, SENTINEL_RETURN_CODE);
            }
            _ = tokio::time::sleep(idle) => {
                self.terminate(&mut child).await;
                let reason = format!("tool did not exit within {:.3}s of closing its output", idle.as_secs_f64());
                forward(tx, StreamLine::Error(reason), cancel, idle).await;
                return (SessionState::Failed, SENTINEL_RETURN_CODE);
            }
            _ = &mut session_deadline => {
                self.terminate(&mut child).await;
                forward(tx, StreamLine::Error("session time limit exceeded".into()), cancel, idle).await;
                return (SessionState::Failed, SENTINEL_RETURN_CODE);
            }
        };

        match status {
            Ok(status) => {
                let code = status.code().unwrap_or(SENTINEL_RETURN_CODE);
                match forward(tx, StreamLine::Finished(code), cancel, idle).await {
                    Delivery::Sent => (SessionState::Completed, code),
                    Delivery::Gone => (SessionState::Cancelled, SENTINEL_RETURN_CODE),
                    Delivery::Stalled | Delivery::Expired => {
                        (SessionState::Failed, SENTINEL_RETURN_CODE)
                    }
                }
            }
            Err(e) => {
                forward(tx, StreamLine::Error(format!("waiting for tool process failed: {e}")), cancel, idle).await;
                (SessionState::Failed, SENTINEL_RETURN_CODE)
            }
        }
    }

    /// Kill the child and reap it, bounded by the kill grace.
    async fn terminate(&self, child: &mut Child) {
        let pid = child.id();
        if let Err(e) = child.start_kill() {
            warn!(pid = ?pid, error = %e, "failed to signal tool process");
        }
        match tokio::time::timeout(self.settings.kill_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(pid = ?pid, %status, "tool process terminated"),
            Ok(Err(e)) => warn!(pid = ?pid, error = %e, "failed to reap tool process"),
            Err(_) => warn!(
                pid = ?pid,
                grace_secs = self.settings.kill_grace.as_secs_f64(),
                "tool process did not exit within kill grace"
            ),
        }
    }
}

enum Delivery {
    Sent,
    /// Client dropped its receiver or the session was cancelled.
    Gone,
    /// Client kept the receiver but did not take a line within the idle
    /// bound.
    Stalled,
    /// Session time limit hit while waiting on the client.
    Expired,
}

/// Send a line, giving up once the client is gone, the session is
/// cancelled, or the client has not made room for `idle`.
async fn forward(
    tx: &mpsc::Sender<StreamLine>,
    line: StreamLine,
    cancel: &CancellationToken,
    idle: Duration,
) -> Delivery {
    tokio::select! {
        sent = tx.send(line) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Gone,
        },
        _ = cancel.cancelled() => Delivery::Gone,
        _ = tokio::time::sleep(idle) => Delivery::Stalled,
    }
}
