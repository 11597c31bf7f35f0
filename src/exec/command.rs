// src/exec/command.rs

//! Command-line construction for the external automation tool.

use std::ffi::OsString;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::ToolSettings;
use crate::types::ExecutionRequest;

/// One invocation of the tool for one request:
///
/// `<executable> -i <inventory> [--vault-password-file <file>] <playbook> --extra-vars <json>`
#[derive(Debug, Clone)]
pub struct ToolInvocation<'a> {
    settings: &'a ToolSettings,
    request: &'a ExecutionRequest,
    structured: bool,
}

impl<'a> ToolInvocation<'a> {
    /// Invocation with the structured (JSON) output env var set.
    pub fn structured(settings: &'a ToolSettings, request: &'a ExecutionRequest) -> Self {
        Self {
            settings,
            request,
            structured: true,
        }
    }

    /// Invocation that leaves the tool's human-readable output alone.
    pub fn passthrough(settings: &'a ToolSettings, request: &'a ExecutionRequest) -> Self {
        Self {
            settings,
            request,
            structured: false,
        }
    }

    /// Arguments after the executable.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), self.settings.inventory.clone().into()];
        if let Some(vault) = &self.settings.vault_password_file {
            args.push("--vault-password-file".into());
            args.push(vault.clone().into());
        }
        args.push(self.settings.playbook.clone().into());
        args.push("--extra-vars".into());
        args.push(self.request.extra_vars().into());
        args
    }

    /// Environment entries layered over the inherited environment.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .settings
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if self.structured {
            let (name, value) = &self.settings.structured_output_env;
            env.push((name.clone(), value.clone()));
        }
        env
    }

    /// Shell-style rendering, for logs and the streaming acknowledgment.
    pub fn render(&self) -> String {
        std::iter::once(self.settings.executable.clone().into_os_string())
            .chain(self.args())
            .map(|arg| shell_quote(&arg.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Ready-to-spawn command: stdin closed, stdout/stderr piped, and the
    /// child killed if its handle is dropped.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.executable);
        cmd.args(self.args())
            .envs(self.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use std::path::PathBuf;

    fn settings() -> ToolSettings {
        let mut s = ToolSettings::new("/usr/bin/ansible-playbook");
        s.vault_password_file = Some(PathBuf::from("/etc/playgate/vault_pass.txt"));
        s.env.insert("ANSIBLE_FORCE_COLOR".into(), "0".into());
        s
    }

    #[test]
    fn args_follow_tool_convention() {
        let settings = settings();
        let req = ExecutionRequest::new("user", "list_users", Payload::new());
        let args: Vec<String> = ToolInvocation::structured(&settings, &req)
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-i",
                "inventory/hosts.ini",
                "--vault-password-file",
                "/etc/playgate/vault_pass.txt",
                "playbook.yml",
                "--extra-vars",
                r#"{"target":"user","action":"list_users","payload":{}}"#,
            ]
        );
    }

    #[test]
    fn structured_mode_adds_output_env() {
        let settings = settings();
        let req = ExecutionRequest::new("user", "list_users", Payload::new());

        let structured = ToolInvocation::structured(&settings, &req).env();
        assert!(structured.contains(&("ANSIBLE_STDOUT_CALLBACK".into(), "json".into())));
        assert!(structured.contains(&("ANSIBLE_FORCE_COLOR".into(), "0".into())));

        let passthrough = ToolInvocation::passthrough(&settings, &req).env();
        assert!(!passthrough.iter().any(|(k, _)| k == "ANSIBLE_STDOUT_CALLBACK"));
    }

    #[test]
    fn render_quotes_json() {
        let settings = ToolSettings::new("ansible-playbook");
        let req = ExecutionRequest::new("user", "list_users", Payload::new());
        assert_eq!(
            ToolInvocation::structured(&settings, &req).render(),
            r#"ansible-playbook -i inventory/hosts.ini playbook.yml --extra-vars '{"target":"user","action":"list_users","payload":{}}'"#
        );
    }
}
