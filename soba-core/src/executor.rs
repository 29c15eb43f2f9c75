//! Workflow Executor — given (Issue, Phase), provision workspace + session,
//! render and spawn the phase command, capture the outcome.
//!
//! The executor never awaits completion: it returns [`ExecOutcome::Started`]
//! as soon as the process is launched, fire-and-forget, the same shape the
//! teacher uses for its container dispatch. The external process is
//! responsible for posting the follow-up label the scheduler observes on a
//! future tick.

use anyhow::Result;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::{Config, PhaseConfig};
use crate::labels::Phase;
use crate::session::{session_name, SessionDriver};
use crate::workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Started,
    Failed,
}

fn phase_config(config: &Config, phase: Phase) -> &PhaseConfig {
    match phase {
        Phase::Plan | Phase::QueuedToPlanning => &config.phase_plan,
        Phase::Implement => &config.phase_implement,
        Phase::Review => &config.phase_review,
        Phase::Revise => &config.phase_revise,
    }
}

fn needs_workspace(phase: Phase) -> bool {
    matches!(phase, Phase::Implement | Phase::Revise)
}

/// Execute `phase` for `issue_number`. `repo_root` is the checkout the
/// scheduler is driving; `session_log_path` is where the session's captured
/// output is written.
pub fn execute(
    driver: &dyn SessionDriver,
    config: &Config,
    repo_root: &Path,
    issue_number: u64,
    phase: Phase,
    session_log_path: &Path,
) -> Result<ExecOutcome> {
    let phase_cfg = phase_config(config, phase);
    let parameter = phase_cfg.render_parameter(issue_number);

    let cwd = if needs_workspace(phase) && config.setup_workspace {
        let worktree_base = repo_root.join(&config.worktree_base_path);
        match workspace::ensure_workspace(
            repo_root,
            &worktree_base,
            issue_number,
            &config.base_branch,
        ) {
            Ok(path) => path,
            Err(_) => return Ok(ExecOutcome::Failed),
        }
    } else {
        repo_root.to_path_buf()
    };

    if config.use_tmux {
        let name = session_name(issue_number);
        if driver.create_session(&name, &cwd, session_log_path).is_err() {
            return Ok(ExecOutcome::Failed);
        }

        let mut args = phase_cfg.options.clone();
        args.push(parameter);
        if driver
            .exec_in_session(&name, &phase_cfg.command, &args)
            .is_err()
        {
            return Ok(ExecOutcome::Failed);
        }
    } else {
        // use_tmux=false: spawn a plain detached child process instead of
        // going through the session driver at all.
        let mut args = phase_cfg.options.clone();
        args.push(parameter);
        let log_file = match std::fs::File::create(session_log_path) {
            Ok(f) => f,
            Err(_) => return Ok(ExecOutcome::Failed),
        };
        let stderr_file = match log_file.try_clone() {
            Ok(f) => f,
            Err(_) => return Ok(ExecOutcome::Failed),
        };
        let spawned = Command::new(&phase_cfg.command)
            .args(&args)
            .current_dir(&cwd)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file))
            .spawn();
        if spawned.is_err() {
            return Ok(ExecOutcome::Failed);
        }
    }

    Ok(ExecOutcome::Started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionDriver;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeDriver {
        created: RefCell<Vec<String>>,
        fail_create: bool,
    }

    impl SessionDriver for FakeDriver {
        fn list_sessions(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn session_exists(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }
        fn create_session(&self, name: &str, _cwd: &Path, _log_path: &Path) -> Result<()> {
            if self.fail_create {
                anyhow::bail!("boom");
            }
            self.created.borrow_mut().push(name.to_string());
            Ok(())
        }
        fn exec_in_session(&self, _name: &str, _command: &str, _args: &[String]) -> Result<()> {
            Ok(())
        }
        fn kill_session(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plan_phase_uses_repo_root_not_a_workspace() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver::default();
        let config = Config::default();
        let log = dir.path().join("session.log");

        let outcome =
            execute(&driver, &config, dir.path(), 7, Phase::Plan, &log).unwrap();
        assert_eq!(outcome, ExecOutcome::Started);
        assert_eq!(driver.created.borrow().as_slice(), ["soba-7"]);
    }

    #[test]
    fn session_create_failure_reports_failed_not_error() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver {
            fail_create: true,
            ..Default::default()
        };
        let config = Config::default();
        let log = dir.path().join("session.log");

        let outcome =
            execute(&driver, &config, dir.path(), 7, Phase::Plan, &log).unwrap();
        assert_eq!(outcome, ExecOutcome::Failed);
    }

    #[test]
    fn use_tmux_false_bypasses_session_driver() {
        let dir = TempDir::new().unwrap();
        let driver = FakeDriver::default();
        let mut config = Config::default();
        config.use_tmux = false;
        config.phase_plan.command = "true".to_string();
        let log = dir.path().join("session.log");

        let outcome =
            execute(&driver, &config, dir.path(), 7, Phase::Plan, &log).unwrap();
        assert_eq!(outcome, ExecOutcome::Started);
        assert!(driver.created.borrow().is_empty());
    }

    #[test]
    fn implement_phase_requests_a_workspace() {
        let dir = TempDir::new().unwrap();
        Command::new("git")
            .current_dir(dir.path())
            .args(["init", "-q", "-b", "main"])
            .status()
            .unwrap();
        Command::new("git")
            .current_dir(dir.path())
            .args(["config", "user.email", "t@example.com"])
            .status()
            .unwrap();
        Command::new("git")
            .current_dir(dir.path())
            .args(["config", "user.name", "t"])
            .status()
            .unwrap();
        std::fs::write(dir.path().join("f"), "x").unwrap();
        Command::new("git")
            .current_dir(dir.path())
            .args(["add", "."])
            .status()
            .unwrap();
        Command::new("git")
            .current_dir(dir.path())
            .args(["commit", "-q", "-m", "init"])
            .status()
            .unwrap();

        let driver = FakeDriver::default();
        let config = Config::default();
        let log = dir.path().join("session.log");

        let outcome =
            execute(&driver, &config, dir.path(), 9, Phase::Implement, &log).unwrap();
        assert_eq!(outcome, ExecOutcome::Started);
        let worktree: PathBuf = dir.path().join(".git/soba/worktrees/issue-9");
        assert!(worktree.exists());
    }
}
