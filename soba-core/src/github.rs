//! Issue Client — reads Issues and swaps labels via the `gh` CLI.
//!
//! All `gh` invocations use structured JSON output (`--json` flags) parsed
//! with `serde_json` into typed Rust structs. No `jq` queries execute in
//! Rust — filtering and decision logic live in `blocking.rs`/`labels.rs` as
//! pure functions, testable without a subprocess.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::process::Command;

use crate::issue::{Issue, IssueState};

/// Outcome of a [`IssueClient::swap_label`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Ok,
    /// `from` was already gone when the call landed — another actor won.
    Conflict,
    NotFound,
}

/// A Pull Request as observed for blocking-checker purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrInfo {
    pub number: u64,
    pub url: String,
    pub labels: Vec<String>,
}

/// Capabilities the core consumes from the external Issue/PR provider.
pub trait IssueClient {
    /// All open Issues with their full label set.
    fn list_open_issues(&self, repository: &str) -> Result<Vec<Issue>>;

    /// Atomically (compare-and-check) swap `from` for `to` on `issue`.
    fn swap_label(
        &self,
        repository: &str,
        issue: u64,
        from: &str,
        to: &str,
    ) -> Result<SwapOutcome>;

    fn add_comment(&self, repository: &str, issue: u64, body: &str) -> Result<()>;

    /// Open PRs whose body references `issue` via a closing keyword.
    fn list_open_prs_referencing(&self, repository: &str, issue: u64) -> Result<Vec<PrInfo>>;
}

/// Issue Client that shells out to the `gh` CLI.
pub struct GhCliIssueClient;

impl GhCliIssueClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GhCliIssueClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Run a `gh` command and return stdout. Propagates errors on non-zero exit.
fn run_gh(repository: &str, args: &[&str]) -> Result<String> {
    let output = Command::new("gh")
        .args(["-R", repository])
        .args(args)
        .output()
        .context("failed to spawn gh command")?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("gh {} failed: {}", args.join(" "), stderr.trim());
    }
}

/// Run a `gh` command that is allowed to fail. Returns stdout on success,
/// empty string on failure.
fn run_gh_soft(repository: &str, args: &[&str]) -> String {
    Command::new("gh")
        .args(["-R", repository])
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
        .unwrap_or_default()
}

/// Check if a PR body references `issue_num` with a closing keyword.
///
/// Matches "closes/fixes/resolves #N" (case-insensitive) with a word
/// boundary after the issue number.
fn body_closes_issue(body: &str, issue_num: u64) -> bool {
    let body_lower = body.to_lowercase();
    let issue_tag = format!("#{issue_num}");

    for keyword in &["closes", "fixes", "resolves"] {
        let mut start = 0;
        let kw = *keyword;
        loop {
            let Some(rel_pos) = body_lower[start..].find(kw) else {
                break;
            };
            let abs_pos = start + rel_pos;
            let after_kw = body_lower[abs_pos + kw.len()..].trim_start_matches(' ');
            if after_kw.starts_with(issue_tag.as_str()) {
                let rest = &after_kw[issue_tag.len()..];
                if rest.is_empty() || !rest.chars().next().unwrap().is_alphanumeric() {
                    return true;
                }
            }
            start = abs_pos + kw.len();
        }
    }
    false
}

fn parse_date(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            DateTime::parse_from_rfc3339("1970-01-01T00:00:00Z")
                .expect("epoch is valid RFC3339")
                .with_timezone(&Utc)
        })
}

#[derive(serde::Deserialize)]
struct RawIssue {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    labels: Vec<RawLabel>,
    #[serde(rename = "updatedAt")]
    updated_at: String,
}

#[derive(serde::Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(serde::Deserialize)]
struct RawPr {
    number: u64,
    url: String,
    body: Option<String>,
    labels: Vec<RawLabel>,
}

impl IssueClient for GhCliIssueClient {
    fn list_open_issues(&self, repository: &str) -> Result<Vec<Issue>> {
        let out = run_gh(
            repository,
            &[
                "issue",
                "list",
                "--state",
                "open",
                "--limit",
                "500",
                "--json",
                "number,title,body,state,labels,updatedAt",
            ],
        )?;
        let raw: Vec<RawIssue> = serde_json::from_str(&out).context("parsing gh issue list")?;
        Ok(raw
            .into_iter()
            .map(|r| Issue {
                number: r.number,
                title: r.title,
                body: r.body.unwrap_or_default(),
                state: if r.state.eq_ignore_ascii_case("open") {
                    IssueState::Open
                } else {
                    IssueState::Closed
                },
                labels: r.labels.into_iter().map(|l| l.name).collect(),
                updated_at: parse_date(&r.updated_at),
            })
            .collect())
    }

    fn swap_label(
        &self,
        repository: &str,
        issue: u64,
        from: &str,
        to: &str,
    ) -> Result<SwapOutcome> {
        let issue_str = issue.to_string();

        // Re-read current labels immediately before writing — a
        // compare-and-check, since the Issues API has no true CAS primitive.
        let out = run_gh(
            repository,
            &["issue", "view", &issue_str, "--json", "labels"],
        )?;
        #[derive(serde::Deserialize)]
        struct Labels {
            labels: Vec<RawLabel>,
        }
        let current: Labels = serde_json::from_str(&out).context("parsing gh issue view")?;
        let has_from = current.labels.iter().any(|l| l.name == from);
        if !has_from {
            return Ok(SwapOutcome::Conflict);
        }

        run_gh(
            repository,
            &["issue", "edit", &issue_str, "--add-label", to],
        )?;
        run_gh(
            repository,
            &["issue", "edit", &issue_str, "--remove-label", from],
        )?;
        Ok(SwapOutcome::Ok)
    }

    fn add_comment(&self, repository: &str, issue: u64, body: &str) -> Result<()> {
        run_gh(
            repository,
            &["issue", "comment", &issue.to_string(), "--body", body],
        )?;
        Ok(())
    }

    fn list_open_prs_referencing(&self, repository: &str, issue: u64) -> Result<Vec<PrInfo>> {
        let out = run_gh_soft(
            repository,
            &[
                "pr", "list", "--state", "open", "--json", "number,url,body,labels",
            ],
        );
        if out.is_empty() {
            return Ok(vec![]);
        }
        let raw: Vec<RawPr> = serde_json::from_str(&out).unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter(|pr| body_closes_issue(pr.body.as_deref().unwrap_or(""), issue))
            .map(|pr| PrInfo {
                number: pr.number,
                url: pr.url,
                labels: pr.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }
}
