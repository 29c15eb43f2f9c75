//! Scheduler — PID-file singleton; periodic tick; selects one eligible
//! Issue per tick; drives label transition + executor; reconciles orphans
//! on startup.
//!
//! Single-threaded, fully sequential tick loop; no async runtime, matching
//! the teacher's own concurrency model exactly.

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::blocking::{may_start_new_cycle, BlockingPolicy};
use crate::config::Config;
use crate::eventlog::EventLog;
use crate::github::{IssueClient, SwapOutcome};
use crate::issue::{Issue, IssueState};
use crate::labels::{current_label_for_phase, determine_phase, next_label, Phase};
use crate::pidfile::PidFile;
use crate::session::{session_name, SessionDriver};
use crate::{executor, workspace};

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Polling,
    Draining,
    Stopped,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Register SIGTERM/SIGINT handlers that flip the shared shutdown flag the
/// tick loop polls once per iteration — the OS-signal analogue of the
/// teacher's file-based drain signal.
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, handle_shutdown_signal as usize);
        libc::signal(libc::SIGINT, handle_shutdown_signal as usize);
    }
}

fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// The polling daemon.
pub struct Scheduler {
    repository: String,
    config: Config,
    repo_root: std::path::PathBuf,
    state: SchedulerState,
    tick_count: u64,
    /// Last tick's Issue snapshot — logging only, no other process-wide state.
    last_snapshot: HashMap<u64, Vec<String>>,
}

impl Scheduler {
    pub fn new(repository: String, config: Config, repo_root: std::path::PathBuf) -> Self {
        Self {
            repository,
            config,
            repo_root,
            state: SchedulerState::Polling,
            tick_count: 0,
            last_snapshot: HashMap::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Run the daemon until SIGTERM/SIGINT.
    pub fn run(
        &mut self,
        issues: &dyn IssueClient,
        sessions: &dyn SessionDriver,
        foreground: bool,
    ) -> Result<()> {
        self.config
            .validate_interval()
            .map_err(|e| crate::error::SobaError::Config(e.to_string()))?;

        let _pid_guard = PidFile::acquire(&self.config.state_dir)?;
        let log = EventLog::open(&self.config.state_dir);
        install_signal_handlers();

        if foreground {
            println!("soba daemon starting");
            println!("Repository: {}", self.repository);
            println!("Interval: {}s", self.config.interval);
            println!("State dir: {}", self.config.state_dir.display());
        }

        self.reconcile_startup(issues, sessions, &log)?;

        loop {
            if shutdown_requested() {
                self.state = SchedulerState::Draining;
                break;
            }

            self.tick(issues, sessions, &log)?;
            self.tick_count += 1;

            std::thread::sleep(Duration::from_secs(self.config.interval));
        }

        self.state = SchedulerState::Stopped;
        Ok(())
    }

    /// Startup reconciliation: list sessions, list Issues, and for each
    /// session `soba-<n>` whose Issue is closed, merged, or absent, mark it
    /// for cleanup — do not auto-kill unless configured.
    fn reconcile_startup(
        &self,
        issues: &dyn IssueClient,
        sessions: &dyn SessionDriver,
        log: &EventLog,
    ) -> Result<()> {
        let all_issues = issues.list_open_issues(&self.repository).unwrap_or_default();
        let open_numbers: Vec<u64> = all_issues.iter().map(|i| i.number).collect();

        for session in sessions.list_sessions().unwrap_or_default() {
            let Some(n) = session
                .strip_prefix("soba-")
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            if !open_numbers.contains(&n) {
                log.stranded_issue(n, "session-without-open-issue");
            }
        }

        for issue in &all_issues {
            let in_progress = ["soba:planning", "soba:doing", "soba:reviewing", "soba:revising"];
            if let Some(label) = issue
                .labels
                .iter()
                .find(|l| in_progress.contains(&l.as_str()))
            {
                let name = session_name(issue.number);
                if !sessions.session_exists(&name).unwrap_or(false) {
                    log.stranded_issue(issue.number, label);
                }
            }
        }

        if self.config.setup_workspace {
            match cleanup_stale_worktrees(&self.config, &self.repo_root, &open_numbers) {
                Ok(removed) => {
                    for issue_number in removed {
                        log.stranded_issue(issue_number, "worktree-without-open-issue");
                    }
                }
                Err(e) => log.error(&format!("worktree cleanup failed: {e:#}")),
            }
        }

        Ok(())
    }

    fn tick(&mut self, issues: &dyn IssueClient, sessions: &dyn SessionDriver, log: &EventLog) -> Result<()> {
        log.tick_start(self.tick_count);

        let all_issues: Vec<Issue> = issues
            .list_open_issues(&self.repository)?
            .into_iter()
            .filter(|i| i.state == IssueState::Open)
            .collect();

        let mut snapshot = HashMap::new();
        for issue in &all_issues {
            snapshot.insert(issue.number, issue.labels.clone());
        }
        self.last_snapshot = snapshot;

        let mut open_pr_labels = Vec::new();
        for issue in &all_issues {
            if let Ok(prs) = issues.list_open_prs_referencing(&self.repository, issue.number) {
                for pr in prs {
                    open_pr_labels.push(pr.labels);
                }
            }
        }
        let policy = BlockingPolicy::default();
        let unblocked = may_start_new_cycle(&all_issues, &open_pr_labels, &policy);

        let mut buckets: HashMap<Phase, Vec<u64>> = HashMap::new();
        for issue in &all_issues {
            if let Some(phase) = determine_phase(&issue.labels) {
                if phase.is_gated_by_blocking_checker() && !unblocked {
                    log.issue_skipped(issue.number, "blocked");
                    continue;
                }
                buckets.entry(phase).or_default().push(issue.number);
            }
        }

        let mut transitioned = None;
        for (phase, mut candidates) in buckets {
            candidates.sort_unstable();
            let Some(&issue_number) = candidates.first() else {
                continue;
            };

            let from = current_label_for_phase(phase).as_str();
            let to = next_label(phase).as_str();

            match issues.swap_label(&self.repository, issue_number, from, to)? {
                SwapOutcome::Ok => {
                    let session_log = self
                        .config
                        .state_dir
                        .join("sessions")
                        .join(format!("{}.log", session_name(issue_number)));
                    let outcome = executor::execute(
                        sessions,
                        &self.config,
                        &self.repo_root,
                        issue_number,
                        phase,
                        &session_log,
                    )?;
                    match outcome {
                        executor::ExecOutcome::Started => {
                            log.issue_dispatch(issue_number, &format!("{phase:?}"), &session_name(issue_number));
                            transitioned = Some(issue_number);
                        }
                        executor::ExecOutcome::Failed => {
                            // Roll back: restore the trigger label.
                            let _ = issues.swap_label(&self.repository, issue_number, to, from);
                            log.error(&format!("spawn failed for issue #{issue_number}"));
                        }
                    }
                }
                SwapOutcome::Conflict => {
                    log.label_conflict(issue_number, from, to);
                }
                SwapOutcome::NotFound => {
                    log.error(&format!("issue #{issue_number} not found during swap"));
                }
            }
        }

        log.tick_end(self.tick_count, transitioned);
        Ok(())
    }
}

/// Remove any worktree under the configured base whose Issue number is not
/// in `live_issue_numbers` — called from `reconcile_startup` so a daemon
/// restarted after Issues closed outside its watch doesn't accumulate dead
/// checkouts.
pub fn cleanup_stale_worktrees(config: &Config, repo_root: &Path, live_issue_numbers: &[u64]) -> Result<Vec<u64>> {
    let worktree_base = repo_root.join(&config.worktree_base_path);
    workspace::cleanup_stale(repo_root, &worktree_base, &config.base_branch, live_issue_numbers)
}
