#![allow(dead_code)]

//! Stand-ins for the external automation tool: small `/bin/sh` scripts
//! written into a temp dir and marked executable.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

pub struct FakeTool {
    dir: TempDir,
}

impl FakeTool {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir for fake tool"),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// File the `hanging*` scripts write their pid to.
    pub fn pid_file(&self) -> PathBuf {
        self.dir.path().join("tool.pid")
    }

    /// Write an executable script with `body` after the shebang.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake tool script");
        let mut perms = fs::metadata(&path).expect("stat fake tool").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod fake tool");
        path
    }

    /// Prints `report` on stdout, `stderr` on stderr, exits with `code`.
    pub fn reporting(&self, report: &str, stderr: &str, code: i32) -> PathBuf {
        self.script(
            "reporting-tool",
            &format!(
                "cat <<'PLAYGATE_REPORT'\n{report}\nPLAYGATE_REPORT\nprintf '%s' '{}' >&2\nexit {code}",
                stderr.replace('\'', r"'\''")
            ),
        )
    }

    /// Prints `report` and exits 0, leaving a background child (pid in
    /// [`pid_file`](Self::pid_file)) that holds stdout open for 30s.
    pub fn reporting_with_lingering_child(&self, report: &str) -> PathBuf {
        self.script(
            "lingering-tool",
            &format!(
                "cat <<'PLAYGATE_REPORT'\n{report}\nPLAYGATE_REPORT\nsleep 30 &\necho $! > '{}'\nexit 0",
                self.pid_file().display()
            ),
        )
    }

    /// Prints each line, sleeping `delay_ms` before each one.
    pub fn printing_lines(&self, lines: &[&str], delay_ms: u64, code: i32) -> PathBuf {
        let delay = format!("{:.3}", delay_ms as f64 / 1000.0);
        let mut body = String::new();
        for line in lines {
            if delay_ms > 0 {
                body.push_str(&format!("sleep {delay}\n"));
            }
            body.push_str(&format!("echo '{}'\n", line.replace('\'', r"'\''")));
        }
        body.push_str(&format!("exit {code}"));
        self.script("printing-tool", &body)
    }

    /// Prints one line, records its pid, then sleeps for a long time.
    pub fn hanging(&self, first_line: &str) -> PathBuf {
        let pid_file = self.pid_file();
        self.script(
            "hanging-tool",
            &format!(
                "echo $$ > '{}'\necho '{}'\nexec sleep 30",
                pid_file.display(),
                first_line.replace('\'', r"'\''")
            ),
        )
    }

    /// Records its pid, prints `count` numbered lines at once, then sleeps
    /// for a long time.
    pub fn flooding(&self, count: usize) -> PathBuf {
        self.script(
            "flooding-tool",
            &format!(
                "echo $$ > '{}'\ni=0\nwhile [ $i -lt {count} ]; do echo \"line $i\"; i=$((i+1)); done\nexec sleep 30",
                self.pid_file().display()
            ),
        )
    }

    /// Writes its argv (one per line) and the structured-output env var
    /// into the temp dir, then prints an empty report.
    pub fn recording(&self) -> PathBuf {
        let args = self.dir.path().join("args.txt");
        let env = self.dir.path().join("env.txt");
        self.script(
            "recording-tool",
            &format!(
                "printf '%s\\n' \"$@\" > '{}'\nprintf '%s' \"${{ANSIBLE_STDOUT_CALLBACK:-unset}}\" > '{}'\necho '{{\"plays\": [], \"stats\": {{}}}}'",
                args.display(),
                env.display()
            ),
        )
    }

    pub fn recorded_args(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("args.txt"))
            .expect("read recorded args")
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn recorded_env(&self) -> String {
        fs::read_to_string(self.dir.path().join("env.txt")).expect("read recorded env")
    }

    /// Path inside the temp dir that does not exist.
    pub fn missing(&self) -> PathBuf {
        self.dir.path().join("no-such-tool")
    }

    /// Poll the pid file written by a `hanging*` script.
    pub async fn wait_for_pid(&self) -> u32 {
        let path = self.pid_file();
        for _ in 0..200 {
            if let Ok(text) = fs::read_to_string(&path) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("fake tool never wrote {}", path.display());
    }
}

impl Default for FakeTool {
    fn default() -> Self {
        Self::new()
    }
}

/// `kill -0` probe for a pid.
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
