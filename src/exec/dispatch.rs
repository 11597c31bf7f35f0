// src/exec/dispatch.rs

//! Concurrent dispatch of independent requests.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

use crate::config::RunnerSettings;
use crate::exec::outcome::ExecutionOutcome;
use crate::exec::runner::JobRunner;
use crate::types::ExecutionRequest;

type JobFuture = Pin<Box<dyn Future<Output = (ExecutionRequest, ExecutionOutcome)> + Send>>;

/// Each request runs on its own task, with at most `max_concurrent` tool
/// processes alive at once.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(runner: JobRunner, settings: RunnerSettings) -> Self {
        Self {
            runner: Arc::new(runner),
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            timeout: settings.timeout,
        }
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    fn job_for(&self, request: ExecutionRequest) -> JobFuture {
        Box::pin(run_job(
            Arc::clone(&self.runner),
            Arc::clone(&self.permits),
            self.timeout,
            request,
        ))
    }

    /// Spawn one request. Must be called inside a Tokio runtime.
    pub fn dispatch(&self, request: ExecutionRequest) -> JoinHandle<(ExecutionRequest, ExecutionOutcome)> {
        tokio::spawn(self.job_for(request))
    }

    /// Spawn every request; results are yielded in completion order.
    pub fn dispatch_all(
        &self,
        requests: impl IntoIterator<Item = ExecutionRequest>,
    ) -> JoinSet<(ExecutionRequest, ExecutionOutcome)> {
        let mut set = JoinSet::new();
        for request in requests {
            set.spawn(self.job_for(request));
        }
        set
    }
}

async fn run_job(
    runner: Arc<JobRunner>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    request: ExecutionRequest,
) -> (ExecutionRequest, ExecutionOutcome) {
    // The semaphore is never closed, so this only waits.
    let _permit = permits.acquire_owned().await.ok();
    debug!(
        target_name = %request.target(),
        action = %request.action(),
        "dispatch slot acquired"
    );
    let outcome = runner.run(&request, timeout).await;
    (request, outcome)
}
