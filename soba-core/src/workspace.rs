//! Workspace Manager — creates and destroys per-Issue Git worktrees.
//!
//! Drives the `git` binary directly via [`std::process::Command`], matching
//! the teacher's practice of never linking a `git2` binding anywhere in its
//! own tree.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Per-Issue file lock coalescing concurrent `ensure_workspace` calls,
/// mirroring the PID-file-as-mutex idiom used for the daemon singleton.
struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    fn acquire(base: &Path, issue_number: u64) -> Result<Self> {
        let locks_dir = base.join(".locks");
        fs::create_dir_all(&locks_dir)?;
        let path = locks_dir.join(format!("issue-{issue_number}.lock"));

        // Best-effort advisory lock: if a stale lock file is present from a
        // crashed process, proceed anyway — ensure_workspace is idempotent.
        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn branch_name(issue_number: u64) -> String {
    format!("soba/issue-{issue_number}")
}

fn worktree_dir_name(issue_number: u64) -> String {
    format!("issue-{issue_number}")
}

fn run_git(repo_root: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .current_dir(repo_root)
        .args(args)
        .output()
        .context("failed to spawn git")
}

/// Ensure a worktree for `issue_number` exists under `worktree_base`, on
/// branch `soba/issue-<n>`, created from `base_branch` if absent. Returns
/// the worktree's path. Idempotent: a second call returns the same path and
/// creates no second worktree.
pub fn ensure_workspace(
    repo_root: &Path,
    worktree_base: &Path,
    issue_number: u64,
    base_branch: &str,
) -> Result<PathBuf> {
    let _lock = WorkspaceLock::acquire(worktree_base, issue_number)?;

    let path = worktree_base.join(worktree_dir_name(issue_number));
    if path.exists() {
        return Ok(path);
    }

    fs::create_dir_all(worktree_base)?;
    let branch = branch_name(issue_number);

    // Reuse the branch if it already exists (e.g. left behind by a previous
    // daemon incarnation whose worktree was pruned but branch was not).
    let branch_exists = run_git(repo_root, &["rev-parse", "--verify", &branch])?
        .status
        .success();

    let out = if branch_exists {
        run_git(
            repo_root,
            &["worktree", "add", &path.display().to_string(), &branch],
        )?
    } else {
        run_git(
            repo_root,
            &[
                "worktree",
                "add",
                "-b",
                &branch,
                &path.display().to_string(),
                base_branch,
            ],
        )?
    };

    if !out.status.success() {
        bail!(
            "git worktree add failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }

    Ok(path)
}

/// Remove the worktree for `issue_number` and delete its branch if merged
/// into `base_branch`.
pub fn destroy_workspace(
    repo_root: &Path,
    worktree_base: &Path,
    issue_number: u64,
    base_branch: &str,
) -> Result<()> {
    let path = worktree_base.join(worktree_dir_name(issue_number));
    if path.exists() {
        let out = run_git(
            repo_root,
            &["worktree", "remove", "--force", &path.display().to_string()],
        )?;
        if !out.status.success() {
            bail!(
                "git worktree remove failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
    }

    let branch = branch_name(issue_number);
    let merged = run_git(repo_root, &["branch", "--merged", base_branch])?;
    let merged_list = String::from_utf8_lossy(&merged.stdout);
    if merged_list.lines().any(|l| l.trim() == branch) {
        let _ = run_git(repo_root, &["branch", "-d", &branch]);
    }

    Ok(())
}

/// Remove worktrees whose associated Issue no longer has a tracked label or
/// is closed. `live_issue_numbers` is the set of Issue numbers that should
/// keep their worktree.
pub fn cleanup_stale(
    repo_root: &Path,
    worktree_base: &Path,
    base_branch: &str,
    live_issue_numbers: &[u64],
) -> Result<Vec<u64>> {
    if !worktree_base.exists() {
        return Ok(vec![]);
    }

    let mut removed = vec![];
    for entry in fs::read_dir(worktree_base)?.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(n) = name.strip_prefix("issue-").and_then(|s| s.parse::<u64>().ok()) else {
            continue;
        };
        if !live_issue_numbers.contains(&n) {
            destroy_workspace(repo_root, worktree_base, n, base_branch)?;
            removed.push(n);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        Command::new("git")
            .current_dir(dir)
            .args(["init", "-q", "-b", "main"])
            .status()
            .unwrap();
        Command::new("git")
            .current_dir(dir)
            .args(["config", "user.email", "test@example.com"])
            .status()
            .unwrap();
        Command::new("git")
            .current_dir(dir)
            .args(["config", "user.name", "test"])
            .status()
            .unwrap();
        fs::write(dir.join("README.md"), "hello").unwrap();
        Command::new("git")
            .current_dir(dir)
            .args(["add", "."])
            .status()
            .unwrap();
        Command::new("git")
            .current_dir(dir)
            .args(["commit", "-q", "-m", "init"])
            .status()
            .unwrap();
    }

    #[test]
    fn ensure_workspace_is_idempotent() {
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let base = repo.path().join("worktrees");

        let p1 = ensure_workspace(repo.path(), &base, 7, "main").unwrap();
        let p2 = ensure_workspace(repo.path(), &base, 7, "main").unwrap();
        assert_eq!(p1, p2);
        assert!(p1.join("README.md").exists());
    }

    #[test]
    fn cleanup_stale_removes_untracked_worktrees() {
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());
        let base = repo.path().join("worktrees");

        ensure_workspace(repo.path(), &base, 1, "main").unwrap();
        ensure_workspace(repo.path(), &base, 2, "main").unwrap();

        let removed = cleanup_stale(repo.path(), &base, "main", &[1]).unwrap();
        assert_eq!(removed, vec![2]);
        assert!(base.join("issue-1").exists());
        assert!(!base.join("issue-2").exists());
    }
}
