//! Session Driver — creates, execs into, and kills named `tmux` sessions.
//!
//! Session naming is safety-critical: [`TmuxSessionDriver::kill_session`]
//! refuses any name that does not start with the reserved prefix (`soba-`,
//! or `soba-test-` when `SOBA_TEST_MODE=true`) — enforced here, not just at
//! call sites, so no future caller can bypass it by construction.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

const PREFIX: &str = "soba-";
const TEST_PREFIX: &str = "soba-test-";

fn test_mode() -> bool {
    std::env::var("SOBA_TEST_MODE").as_deref() == Ok("true")
}

fn allowed_prefix() -> &'static str {
    if test_mode() {
        TEST_PREFIX
    } else {
        PREFIX
    }
}

/// Capabilities consumed from an external terminal-multiplexer binary.
pub trait SessionDriver {
    fn list_sessions(&self) -> Result<Vec<String>>;
    fn session_exists(&self, name: &str) -> Result<bool>;
    fn create_session(&self, name: &str, cwd: &Path, log_path: &Path) -> Result<()>;
    fn exec_in_session(&self, name: &str, command: &str, args: &[String]) -> Result<()>;
    fn kill_session(&self, name: &str) -> Result<()>;
}

/// `tmux`-backed session driver.
pub struct TmuxSessionDriver;

impl TmuxSessionDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TmuxSessionDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn run_tmux(args: &[&str]) -> Result<std::process::Output> {
    Command::new("tmux")
        .args(args)
        .output()
        .context("failed to spawn tmux")
}

impl SessionDriver for TmuxSessionDriver {
    fn list_sessions(&self) -> Result<Vec<String>> {
        let out = Command::new("tmux")
            .args(["list-sessions", "-F", "#{session_name}"])
            .output()
            .context("failed to spawn tmux list-sessions")?;
        if !out.status.success() {
            // No server running yet — treat as an empty session list.
            return Ok(vec![]);
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect())
    }

    fn session_exists(&self, name: &str) -> Result<bool> {
        let status = Command::new("tmux")
            .args(["has-session", "-t", name])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .context("failed to spawn tmux has-session")?;
        Ok(status.success())
    }

    fn create_session(&self, name: &str, cwd: &Path, log_path: &Path) -> Result<()> {
        if self.session_exists(name)? {
            return Ok(());
        }
        let out = run_tmux(&[
            "new-session",
            "-d",
            "-s",
            name,
            "-c",
            &cwd.display().to_string(),
        ])?;
        if !out.status.success() {
            bail!(
                "tmux new-session failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        run_tmux(&["set-option", "-t", name, "history-limit", "50000"])?;
        let pipe_cmd = format!("cat >> {}", shell_quote(&log_path.display().to_string()));
        run_tmux(&["pipe-pane", "-t", name, "-o", &pipe_cmd])?;
        Ok(())
    }

    fn exec_in_session(&self, name: &str, command: &str, args: &[String]) -> Result<()> {
        let mut line = shell_quote(command);
        for a in args {
            line.push(' ');
            line.push_str(&shell_quote(a));
        }
        line.push('\n');
        let out = run_tmux(&["send-keys", "-t", name, &line, "Enter"])?;
        if !out.status.success() {
            bail!(
                "tmux send-keys failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        if !name.starts_with(allowed_prefix()) {
            bail!(
                "refusing to kill session `{name}`: must start with `{}`",
                allowed_prefix()
            );
        }
        let out = run_tmux(&["kill-session", "-t", name])?;
        if !out.status.success() {
            bail!(
                "tmux kill-session failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Name of the tmux session owning Issue `n`.
pub fn session_name(issue_number: u64) -> String {
    format!("soba-{issue_number}")
}
