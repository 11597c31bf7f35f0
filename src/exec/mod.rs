// src/exec/mod.rs

//! Process execution layer.
//!
//! Every execution is one run of the external automation tool, built by
//! [`command::ToolInvocation`] and driven through `tokio::process`.
//!
//! - [`runner`] owns the buffered `JobRunner` (capture, timeout, normalize).
//! - [`stream`] owns the line-forwarding `StreamingSession`.
//! - [`dispatch`] runs many independent requests with bounded concurrency.
//! - [`outcome`] holds what a buffered run returns to the caller.

pub mod command;
pub mod dispatch;
pub mod outcome;
pub mod runner;
pub mod stream;

pub use command::ToolInvocation;
pub use dispatch::Dispatcher;
pub use outcome::{ExecutionOutcome, OutcomeKind, SENTINEL_RETURN_CODE};
pub use runner::JobRunner;
pub use stream::{SessionHandle, SessionLines, SessionState, StreamLine, StreamingSession};
