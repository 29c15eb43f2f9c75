use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use soba_core::auth;
use soba_core::config::Config;
use soba_core::error::SobaError;
use soba_core::eventlog::EventLog;
use soba_core::github::{GhCliIssueClient, IssueClient};
use soba_core::labels::{determine_phase, Label};
use soba_core::pidfile::{self, PidStatus};
use soba_core::scheduler::Scheduler;
use soba_core::session::{SessionDriver, TmuxSessionDriver};

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SOBA_GIT_HASH"), ")");

#[derive(Parser)]
#[command(
    name = "soba",
    version,
    long_version = LONG_VERSION,
    about = "Autonomous GitHub issue orchestrator"
)]
pub struct Cli {
    /// Override the state directory (default: ~/.soba).
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the daemon.
    Start {
        #[arg(long)]
        foreground: bool,
    },
    /// Signal the daemon to exit.
    Stop,
    /// Report daemon state and tail the log.
    Status,
    /// Issue-related debug commands.
    Issue {
        #[command(subcommand)]
        subcommand: IssueCommands,
    },
    /// Attach to or list session logs.
    Monitor {
        issue: Option<u64>,
        #[arg(long)]
        follow_log: bool,
        #[arg(long)]
        list: bool,
        #[arg(long, value_name = "DAYS", num_args = 0..=1, default_missing_value = "7")]
        cleanup: Option<u64>,
    },
    /// Label-management commands.
    Labels {
        #[command(subcommand)]
        subcommand: LabelsCommands,
    },
    /// Print a shell completion script.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum IssueCommands {
    /// Print the Issue/phase table.
    List {
        #[arg(long)]
        repository: String,
    },
}

#[derive(Subcommand)]
pub enum LabelsCommands {
    /// Ensure the twelve soba: labels exist on the repository.
    Init {
        #[arg(long)]
        repository: String,
    },
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    let state_dir = cli
        .state_dir
        .unwrap_or_else(|| Config::default().state_dir);

    match cli.command {
        None => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Start { foreground }) => cmd_start(&state_dir, foreground),
        Some(Commands::Stop) => cmd_stop(&state_dir),
        Some(Commands::Status) => cmd_status(&state_dir),
        Some(Commands::Issue { subcommand }) => match subcommand {
            IssueCommands::List { repository } => cmd_issue_list(&repository),
        },
        Some(Commands::Monitor {
            issue,
            follow_log,
            list,
            cleanup,
        }) => cmd_monitor(&state_dir, issue, follow_log, list, cleanup),
        Some(Commands::Labels { subcommand }) => match subcommand {
            LabelsCommands::Init { repository } => cmd_labels_init(&repository),
        },
        Some(Commands::Completions { shell }) => cmd_completions(shell),
    }
}

fn cmd_start(state_dir: &std::path::Path, foreground: bool) -> Result<ExitCode> {
    let config = Config::load(state_dir);
    let Some(repository) = config.github_repository.clone() else {
        return Err(SobaError::Config("github.repository is not configured".to_string()).into());
    };

    auth::preflight_auth(&config)?;

    let repo_root = std::env::current_dir()?;
    let mut scheduler = Scheduler::new(repository, config, repo_root);
    let issues = GhCliIssueClient::new();
    let sessions = TmuxSessionDriver::new();

    match scheduler.run(&issues, &sessions, foreground) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) if e.to_string().contains("already running") => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e),
    }
}

fn cmd_stop(state_dir: &std::path::Path) -> Result<ExitCode> {
    match pidfile::probe(state_dir)? {
        PidStatus::Running { pid } => {
            if pidfile::terminate(pid) {
                println!("Sent SIGTERM to soba (pid {pid})");
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("failed to signal pid {pid}");
                Ok(ExitCode::FAILURE)
            }
        }
        PidStatus::Stale { .. } | PidStatus::Absent => {
            eprintln!("soba is not running");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_status(state_dir: &std::path::Path) -> Result<ExitCode> {
    let log = EventLog::open(state_dir);
    match pidfile::probe(state_dir)? {
        PidStatus::Running { pid } => {
            let uptime = pidfile::uptime_secs(state_dir)
                .map(pidfile::format_duration)
                .unwrap_or_else(|| "-".to_string());
            println!("running (pid {pid}, uptime {uptime})");
            for line in log.tail(10) {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        PidStatus::Stale { pid } => {
            println!("stale (pid file present, pid {pid} not running)");
            for line in log.tail(10) {
                println!("{line}");
            }
            Ok(ExitCode::FAILURE)
        }
        PidStatus::Absent => {
            println!("absent");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_issue_list(repository: &str) -> Result<ExitCode> {
    let client = GhCliIssueClient::new();
    let issues = client
        .list_open_issues(repository)
        .context("listing open issues")?;

    println!("{:<8}{:<12}{}", "NUMBER", "PHASE", "TITLE");
    for issue in issues {
        let phase = determine_phase(&issue.labels)
            .map(|p| format!("{p:?}"))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<8}{:<12}{}", issue.number, phase, issue.title);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_monitor(
    state_dir: &std::path::Path,
    issue: Option<u64>,
    follow_log: bool,
    list: bool,
    cleanup_days: Option<u64>,
) -> Result<ExitCode> {
    let sessions_dir = state_dir.join("sessions");

    if let Some(days) = cleanup_days {
        let cutoff = std::time::SystemTime::now() - std::time::Duration::from_secs(days * 86400);
        if sessions_dir.exists() {
            for entry in std::fs::read_dir(&sessions_dir)?.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if meta.modified().is_ok_and(|m| m < cutoff) {
                        let _ = std::fs::remove_file(entry.path());
                    }
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if list || issue.is_none() {
        if sessions_dir.exists() {
            for entry in std::fs::read_dir(&sessions_dir)?.flatten() {
                println!("{}", entry.path().display());
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(n) = issue {
        let log_path = sessions_dir.join(format!("soba-{n}.log"));
        if follow_log {
            let status = std::process::Command::new("tail")
                .args(["-f", &log_path.display().to_string()])
                .status()?;
            return Ok(if status.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        let status = std::process::Command::new("tmux")
            .args(["attach-session", "-t", &format!("soba-{n}")])
            .status()?;
        return Ok(if status.success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_labels_init(repository: &str) -> Result<ExitCode> {
    for label in Label::all() {
        let status = std::process::Command::new("gh")
            .args([
                "label",
                "create",
                label.as_str(),
                "--repo",
                repository,
                "--description",
                label.description(),
                "--force",
            ])
            .status()
            .context("spawning gh label create")?;
        if !status.success() {
            eprintln!("failed to ensure label {}", label.as_str());
            return Ok(ExitCode::FAILURE);
        }
    }
    println!("All soba: labels present on {repository}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_completions(shell: clap_complete::Shell) -> Result<ExitCode> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}
