// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, RequestArgs};
use crate::config::{default_config_path, load_and_validate, parse_duration, ConfigFile};
use crate::errors::PlaygateError;
use crate::exec::{Dispatcher, JobRunner, SessionState, StreamLine, StreamingSession, ToolInvocation};
use crate::metrics::{open_store, MetricsSink};
use crate::report::Normalizer;
use crate::types::{ExecutionRequest, Payload};

/// High-level entry point used by `main.rs`.
///
/// Returns `Ok(true)` when the requested work succeeded, `Ok(false)` when it
/// ran but did not succeed (the binary then exits non-zero).
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config '{}'", config_path.display()))?;
    debug!(config = %config_path.display(), "configuration loaded");

    match args.command {
        Command::Check {
            target,
            action,
            payload,
        } => {
            let request = match (target, action) {
                (Some(target), Some(action)) => {
                    let payload = parse_payload(&payload)?;
                    Some(ExecutionRequest::addressed(target, action, payload)?)
                }
                _ => None,
            };
            print_check(&config_path, &cfg, request.as_ref())?;
            Ok(true)
        }
        Command::Stats => {
            let sink = MetricsSink::spawn(open_store(&cfg.metrics));
            let summary = sink.aggregate().await?.rounded();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(true)
        }
        Command::Run { request, timeout } => {
            let request = request_from_args(&request).await?;
            cfg.catalog.check(&request)?;
            let timeout = match timeout {
                Some(text) => parse_duration(&text)
                    .map_err(|e| anyhow!("invalid --timeout '{text}': {e}"))?,
                None => cfg.runner.timeout,
            };

            let metrics = MetricsSink::spawn(open_store(&cfg.metrics));
            let runner = job_runner(&cfg, metrics.clone());
            let cancel = cancel_on_ctrl_c();

            let outcome = runner.run_with_cancel(&request, timeout, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            metrics.flush().await;
            Ok(outcome.succeeded())
        }
        Command::Stream { request } => {
            let request = request_from_args(&request).await?;
            cfg.catalog.check(&request)?;

            let metrics = MetricsSink::spawn(open_store(&cfg.metrics));
            let session =
                StreamingSession::new(Arc::new(cfg.tool.clone()), cfg.stream, metrics.clone());
            let (mut lines, handle) = session.open(request, cancel_on_ctrl_c());

            let mut exit_code = None;
            while let Some(line) = lines.next().await {
                if let StreamLine::Finished(code) = line {
                    exit_code = Some(code);
                }
                println!("{line}");
            }
            let state = handle.wait().await;
            metrics.flush().await;
            Ok(state == SessionState::Completed && exit_code == Some(0))
        }
        Command::Batch { input } => {
            let text = read_input(input.as_deref()).await?;
            let metrics = MetricsSink::spawn(open_store(&cfg.metrics));
            let dispatcher = Dispatcher::new(job_runner(&cfg, metrics.clone()), cfg.runner);

            let mut all_ok = true;
            let mut requests = Vec::new();
            for (idx, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let decoded = ExecutionRequest::from_json_str(line)
                    .and_then(|req| cfg.catalog.check(&req).map(|()| req));
                match decoded {
                    Ok(req) => requests.push(req),
                    Err(e) => {
                        warn!(line = idx + 1, error = %e, "skipping batch request");
                        all_ok = false;
                        println!("{}", json!({ "line": idx + 1, "error": e.to_string() }));
                    }
                }
            }
            info!(count = requests.len(), "dispatching batch");

            let mut set = dispatcher.dispatch_all(requests);
            while let Some(joined) = set.join_next().await {
                let (request, outcome) = joined.context("batch job panicked")?;
                all_ok &= outcome.succeeded();
                println!("{}", json!({ "request": request, "outcome": outcome }));
            }
            metrics.flush().await;
            Ok(all_ok)
        }
    }
}

fn job_runner(cfg: &ConfigFile, metrics: MetricsSink) -> JobRunner {
    JobRunner::new(
        Arc::new(cfg.tool.clone()),
        Normalizer::new(cfg.normalizer.clone()),
        metrics,
    )
    .with_kill_grace(cfg.runner.kill_grace)
}

/// Ctrl-C → cancellation of whatever is running.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; cancelling");
        token.cancel();
    });
    cancel
}

async fn request_from_args(args: &RequestArgs) -> Result<ExecutionRequest> {
    let payload = match (&args.payload, &args.payload_file) {
        (Some(text), _) => parse_payload(text)?,
        (None, Some(path)) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading payload file '{}'", path.display()))?;
            parse_payload(&text)?
        }
        (None, None) => Payload::new(),
    };
    Ok(ExecutionRequest::addressed(
        args.target.as_str(),
        args.action.as_str(),
        payload,
    )?)
}

fn parse_payload(text: &str) -> Result<Payload, PlaygateError> {
    serde_json::from_str(text)
        .map_err(|e| PlaygateError::InvalidRequest(format!("payload must be a JSON object: {e}")))
}

async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading batch input '{}'", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("reading batch input from stdin")?;
            Ok(text)
        }
    }
}

/// Dry-run output: effective settings, the catalog and optionally the
/// command line a request would run.
fn print_check(config_path: &Path, cfg: &ConfigFile, request: Option<&ExecutionRequest>) -> Result<()> {
    println!("playgate check: {}", config_path.display());
    println!("  tool.executable = {}", cfg.tool.executable.display());
    println!("  tool.inventory = {}", cfg.tool.inventory.display());
    println!("  tool.playbook = {}", cfg.tool.playbook.display());
    if let Some(vault) = &cfg.tool.vault_password_file {
        println!("  tool.vault_password_file = {}", vault.display());
    }
    println!(
        "  tool.structured_output = {}={}",
        cfg.tool.structured_output_env.0, cfg.tool.structured_output_env.1
    );
    println!("  runner.timeout = {:?}", cfg.runner.timeout);
    println!("  runner.max_concurrent = {}", cfg.runner.max_concurrent);
    println!("  stream.line_idle_timeout = {:?}", cfg.stream.line_idle_timeout);
    if let Some(limit) = cfg.stream.session_timeout {
        println!("  stream.session_timeout = {limit:?}");
    }
    println!("  metrics.store = {:?}", cfg.metrics.store);
    println!("  metrics.path = {}", cfg.metrics.path.display());
    println!(
        "  normalizer.display_pattern = {}",
        cfg.normalizer.display_pattern.as_str()
    );
    println!();

    if cfg.catalog.is_empty() {
        println!("catalog: (empty, all target/action pairs accepted)");
    } else {
        println!("catalog:");
        for (target, action, contract) in cfg.catalog.entries() {
            if contract.required.is_empty() {
                println!("  - {target}/{action}");
            } else {
                println!("  - {target}/{action} (required: {})", contract.required.join(", "));
            }
        }
    }

    if let Some(request) = request {
        cfg.catalog.check(request)?;
        println!();
        println!("command:");
        println!("  {}", ToolInvocation::structured(&cfg.tool, request).render());
    }

    debug!("check complete (no execution)");
    Ok(())
}
