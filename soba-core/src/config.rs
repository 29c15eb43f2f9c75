//! Configuration — loaded from env vars and `~/.soba/config`.
//!
//! Resolution order: config-file entries are applied first, then
//! environment overrides, so `SOBA_*` env vars always win — mirroring the
//! teacher's `WorkerConfig::load`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

const DEFAULT_INTERVAL: u64 = 20;
const MIN_INTERVAL: u64 = 10;
const DEFAULT_WORKTREE_BASE: &str = ".git/soba/worktrees";
const DEFAULT_BASE_BRANCH: &str = "main";

/// How a phase's external process should be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseConfig {
    pub command: String,
    pub options: Vec<String>,
    /// Template with `{{issue-number}}` substitution.
    pub parameter: String,
}

impl PhaseConfig {
    /// Render `parameter` with the Issue number substituted in.
    pub fn render_parameter(&self, issue_number: u64) -> String {
        self.parameter
            .replace("{{issue-number}}", &issue_number.to_string())
    }
}

fn default_phase(command: &str, parameter: &str) -> PhaseConfig {
    PhaseConfig {
        command: command.to_string(),
        options: vec![],
        parameter: parameter.to_string(),
    }
}

/// GitHub auth method selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Gh,
    Env,
    /// Auto-detect, preferring `gh`.
    Auto,
}

/// Runtime configuration resolved from env vars, config file, and defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_repository: Option<String>,
    pub auth_method: AuthMethod,
    /// Seconds between ticks; must be ≥ [`MIN_INTERVAL`], validated at startup.
    pub interval: u64,
    pub use_tmux: bool,
    pub worktree_base_path: String,
    pub setup_workspace: bool,
    pub base_branch: String,
    pub phase_plan: PhaseConfig,
    pub phase_implement: PhaseConfig,
    pub phase_review: PhaseConfig,
    pub phase_revise: PhaseConfig,
    pub state_dir: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_repository: None,
            auth_method: AuthMethod::Auto,
            interval: DEFAULT_INTERVAL,
            use_tmux: true,
            worktree_base_path: DEFAULT_WORKTREE_BASE.to_string(),
            setup_workspace: true,
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
            phase_plan: default_phase("claude", "Plan issue {{issue-number}}"),
            phase_implement: default_phase("claude", "Implement issue {{issue-number}}"),
            phase_review: default_phase("claude", "Review issue {{issue-number}}"),
            phase_revise: default_phase("claude", "Revise issue {{issue-number}} per feedback"),
            state_dir: default_state_dir(),
        }
    }
}

fn default_state_dir() -> std::path::PathBuf {
    std::env::var("SOBA_STATE_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            dirs_home()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(".soba")
        })
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

/// Error raised when `workflow.interval` is below [`MIN_INTERVAL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalTooLow {
    pub given: u64,
}

impl std::fmt::Display for IntervalTooLow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Interval must be at least {MIN_INTERVAL}s (got {}s)",
            self.given
        )
    }
}

impl Config {
    /// Load config from `<state_dir>/config` and environment overrides.
    pub fn load(state_dir: &Path) -> Self {
        let mut cfg = Self {
            state_dir: state_dir.to_path_buf(),
            ..Self::default()
        };

        let config_file = state_dir.join("config");
        if let Ok(contents) = fs::read_to_string(&config_file) {
            let entries = parse_file(&contents);
            apply_file_entries(&mut cfg, &entries);
        }

        apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
        cfg
    }

    /// Validate `interval` against the minimum, returning the boundary error
    /// message the startup sequence surfaces.
    pub fn validate_interval(&self) -> Result<(), IntervalTooLow> {
        if self.interval < MIN_INTERVAL {
            Err(IntervalTooLow {
                given: self.interval,
            })
        } else {
            Ok(())
        }
    }
}

fn parse_file(contents: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    entries
}

fn apply_file_entries(cfg: &mut Config, entries: &HashMap<String, String>) {
    for (key, value) in entries {
        match key.as_str() {
            "github.repository" => cfg.github_repository = Some(value.clone()),
            "github.auth_method" => cfg.auth_method = parse_auth_method(value),
            "workflow.interval" => {
                if let Ok(n) = value.parse() {
                    cfg.interval = n;
                }
            }
            "workflow.use_tmux" => cfg.use_tmux = value == "true",
            "git.worktree_base_path" => cfg.worktree_base_path = value.clone(),
            "git.setup_workspace" => cfg.setup_workspace = value == "true",
            "git.base_branch" => cfg.base_branch = value.clone(),
            _ => apply_phase_file_entry(cfg, key, value),
        }
    }
}

/// Handle `phase.{plan|implement|review|revise}.{command,options,parameter}`
/// keys — the five phase command templates of spec §6, kept out of the flat
/// match above since each maps onto a nested `PhaseConfig`.
fn apply_phase_file_entry(cfg: &mut Config, key: &str, value: &str) {
    let Some(rest) = key.strip_prefix("phase.") else {
        return;
    };
    let Some((phase, field)) = rest.split_once('.') else {
        return;
    };
    let phase_cfg = match phase {
        "plan" => &mut cfg.phase_plan,
        "implement" => &mut cfg.phase_implement,
        "review" => &mut cfg.phase_review,
        "revise" => &mut cfg.phase_revise,
        _ => return,
    };
    match field {
        "command" => phase_cfg.command = value.to_string(),
        "options" => phase_cfg.options = split_options(value),
        "parameter" => phase_cfg.parameter = value.to_string(),
        _ => {}
    }
}

/// `options[]` is written as a comma-separated list in the flat config file.
fn split_options(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_auth_method(s: &str) -> AuthMethod {
    match s {
        "gh" => AuthMethod::Gh,
        "env" => AuthMethod::Env,
        _ => AuthMethod::Auto,
    }
}

/// Apply `SOBA_*` environment overrides. `get_env` is injected so tests can
/// simulate environment variables without mutating the real process
/// environment.
fn apply_env_overrides(cfg: &mut Config, get_env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = get_env("SOBA_GITHUB_REPOSITORY") {
        cfg.github_repository = Some(v);
    }
    if let Some(v) = get_env("SOBA_AUTH_METHOD") {
        cfg.auth_method = parse_auth_method(&v);
    }
    if let Some(v) = get_env("SOBA_INTERVAL") {
        if let Ok(n) = v.parse() {
            cfg.interval = n;
        }
    }
    if let Some(v) = get_env("SOBA_USE_TMUX") {
        cfg.use_tmux = v == "true";
    }
    if let Some(v) = get_env("SOBA_WORKTREE_BASE_PATH") {
        cfg.worktree_base_path = v;
    }
    if let Some(v) = get_env("SOBA_STATE_DIR") {
        cfg.state_dir = std::path::PathBuf::from(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_have_valid_interval() {
        let cfg = Config::default();
        assert!(cfg.validate_interval().is_ok());
        assert_eq!(cfg.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn interval_below_minimum_fails_validation() {
        let mut cfg = Config::default();
        cfg.interval = 5;
        let err = cfg.validate_interval().unwrap_err();
        assert!(err.to_string().contains("Interval must be at least"));
    }

    #[test]
    fn file_entries_are_applied() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config"),
            "github.repository=acme/widgets\nworkflow.interval=30\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path());
        assert_eq!(cfg.github_repository.as_deref(), Some("acme/widgets"));
        assert_eq!(cfg.interval, 30);
    }

    #[test]
    fn env_override_wins_over_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config"), "workflow.interval=30\n").unwrap();
        let mut cfg = Config::load(dir.path());
        apply_env_overrides(&mut cfg, |k| {
            if k == "SOBA_INTERVAL" {
                Some("45".to_string())
            } else {
                None
            }
        });
        assert_eq!(cfg.interval, 45);
    }

    #[test]
    fn render_parameter_substitutes_issue_number() {
        let phase = default_phase("claude", "Implement {{issue-number}} now");
        assert_eq!(phase.render_parameter(42), "Implement 42 now");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored_in_config_file() {
        let entries = parse_file("# a comment\n\nworkflow.interval=15\n");
        assert_eq!(entries.get("workflow.interval"), Some(&"15".to_string()));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn phase_command_templates_are_settable_from_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config"),
            "phase.plan.command=my-agent\n\
             phase.plan.options=--flag, --verbose\n\
             phase.plan.parameter=plan {{issue-number}}\n\
             phase.implement.command=other-agent\n\
             phase.review.parameter=review {{issue-number}} now\n\
             phase.revise.options=--retry\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path());

        assert_eq!(cfg.phase_plan.command, "my-agent");
        assert_eq!(cfg.phase_plan.options, vec!["--flag", "--verbose"]);
        assert_eq!(cfg.phase_plan.parameter, "plan {{issue-number}}");
        assert_eq!(cfg.phase_implement.command, "other-agent");
        assert_eq!(cfg.phase_review.parameter, "review {{issue-number}} now");
        assert_eq!(cfg.phase_revise.options, vec!["--retry"]);
    }

    #[test]
    fn unknown_phase_or_field_keys_are_ignored() {
        let mut cfg = Config::default();
        let before = cfg.phase_plan.clone();
        apply_phase_file_entry(&mut cfg, "phase.plan.unknown_field", "x");
        apply_phase_file_entry(&mut cfg, "phase.unknown_phase.command", "x");
        apply_phase_file_entry(&mut cfg, "not_a_phase_key", "x");
        assert_eq!(cfg.phase_plan, before);
    }
}
