// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `playgate`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "playgate",
    version,
    about = "Run automation playbooks per request, normalize their reports and record metrics.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `PLAYGATE_CONFIG`, else `Playgate.toml` in the current
    /// working directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PLAYGATE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one request and print its outcome as JSON.
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Override `runner.timeout` (e.g. "30s", "5m").
        #[arg(long, value_name = "DURATION")]
        timeout: Option<String>,
    },

    /// Run one request, forwarding the tool's output line by line.
    Stream {
        #[command(flatten)]
        request: RequestArgs,
    },

    /// Run JSON-lines requests concurrently, one outcome line per request.
    Batch {
        /// Read requests from this file instead of stdin.
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
    },

    /// Print aggregate statistics from the metrics ledger.
    Stats,

    /// Validate the config and show what would be executed.
    Check {
        /// Also render the command line for this target.
        #[arg(long, value_name = "NAME", requires = "action")]
        target: Option<String>,

        #[arg(long, value_name = "NAME", requires = "target")]
        action: Option<String>,

        /// Payload as a JSON object.
        #[arg(long, value_name = "JSON", default_value = "{}")]
        payload: String,
    },
}

/// Target/action/payload of a single request.
#[derive(Debug, Clone, Args)]
pub struct RequestArgs {
    /// Managed resource category (e.g. "user", "webserver").
    #[arg(long, value_name = "NAME")]
    pub target: String,

    /// Operation on the target (e.g. "create", "list_users").
    #[arg(long, value_name = "NAME")]
    pub action: String,

    /// Payload as a JSON object.
    #[arg(long, value_name = "JSON", conflicts_with = "payload_file")]
    pub payload: Option<String>,

    /// Read the payload JSON object from a file.
    #[arg(long, value_name = "PATH")]
    pub payload_file: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_payload() {
        let args = CliArgs::try_parse_from([
            "playgate",
            "--config",
            "conf/Playgate.toml",
            "run",
            "--target",
            "user",
            "--action",
            "create",
            "--payload",
            r#"{"username":"alice"}"#,
            "--timeout",
            "30s",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("conf/Playgate.toml")));
        match args.command {
            Command::Run { request, timeout } => {
                assert_eq!(request.target, "user");
                assert_eq!(request.action, "create");
                assert_eq!(request.payload.as_deref(), Some(r#"{"username":"alice"}"#));
                assert_eq!(timeout.as_deref(), Some("30s"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn payload_and_payload_file_conflict() {
        let res = CliArgs::try_parse_from([
            "playgate", "stream", "--target", "user", "--action", "create", "--payload", "{}",
            "--payload-file", "p.json",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn check_requires_target_and_action_together() {
        assert!(CliArgs::try_parse_from(["playgate", "check", "--target", "user"]).is_err());
        assert!(CliArgs::try_parse_from(["playgate", "check"]).is_ok());
    }
}
