//! PID-file daemon singleton: `<state_dir>/soba.pid`.
//!
//! The PID file is the mutual-exclusion primitive for the daemon — its
//! presence is intended to mean exactly one scheduler process is alive. This
//! is enforced with a fail-if-present-and-live check at startup, and a stale
//! (process-gone) file is silently replaced rather than treated as an error.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// RAII guard holding the PID file; removes it on drop (clean shutdown).
pub struct PidFile {
    path: PathBuf,
}

/// Outcome of probing the PID file without yet acquiring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidStatus {
    /// No PID file — no daemon has run, or it shut down cleanly.
    Absent,
    /// PID file present and the process is alive.
    Running { pid: u32 },
    /// PID file present but the process is gone.
    Stale { pid: u32 },
}

fn pid_path(state_dir: &Path) -> PathBuf {
    state_dir.join("soba.pid")
}

/// Is the process with `pid` currently alive? Uses `kill(pid, 0)` directly,
/// which checks existence without delivering a signal.
pub fn is_pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Send `SIGTERM` to `pid`, asking the daemon to drain and exit. Returns
/// `false` if the kernel rejected the signal (process already gone, or not
/// ours to signal).
pub fn terminate(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

/// Inspect the PID file without acquiring it.
pub fn probe(state_dir: &Path) -> Result<PidStatus> {
    let path = pid_path(state_dir);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let pid: u32 = contents
                .trim()
                .parse()
                .with_context(|| format!("corrupt pid file at {}", path.display()))?;
            if is_pid_alive(pid) {
                Ok(PidStatus::Running { pid })
            } else {
                Ok(PidStatus::Stale { pid })
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PidStatus::Absent),
        Err(e) => Err(e.into()),
    }
}

/// Seconds elapsed since the PID file was created, used by `status` to
/// report daemon uptime. `None` if the file is absent or the filesystem
/// does not expose a creation time (falls back to mtime).
pub fn uptime_secs(state_dir: &Path) -> Option<i64> {
    let path = pid_path(state_dir);
    let meta = fs::metadata(&path).ok()?;
    let created = meta.created().or_else(|_| meta.modified()).ok()?;
    created.elapsed().ok().map(|d| d.as_secs() as i64)
}

/// Format a duration in seconds as a human-readable string, e.g. `4m23s`.
pub fn format_duration(secs: i64) -> String {
    if secs < 0 {
        return "-".to_string();
    }
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

impl PidFile {
    /// Acquire the daemon singleton. Fails if a live daemon already holds it;
    /// silently replaces a stale file.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir)?;
        let path = pid_path(state_dir);

        if let PidStatus::Running { pid } = probe(state_dir)? {
            anyhow::bail!("soba is already running (pid {pid})");
        }

        fs::write(&path, format!("{}\n", std::process::id()))?;
        Ok(Self { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_when_no_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(probe(dir.path()).unwrap(), PidStatus::Absent);
    }

    #[test]
    fn acquire_writes_own_pid() {
        let dir = TempDir::new().unwrap();
        let guard = PidFile::acquire(dir.path()).unwrap();
        let status = probe(dir.path()).unwrap();
        assert_eq!(
            status,
            PidStatus::Running {
                pid: std::process::id()
            }
        );
        drop(guard);
        assert_eq!(probe(dir.path()).unwrap(), PidStatus::Absent);
    }

    #[test]
    fn second_acquire_fails_while_first_is_live() {
        let dir = TempDir::new().unwrap();
        let _guard = PidFile::acquire(dir.path()).unwrap();
        let err = PidFile::acquire(dir.path()).unwrap_err();
        assert!(err.to_string().contains("already running"));
        // The first guard's file must remain untouched by the failed attempt.
        assert!(matches!(probe(dir.path()).unwrap(), PidStatus::Running { .. }));
    }

    #[test]
    fn terminate_fails_against_an_already_dead_pid() {
        // PID 999999 is exceedingly unlikely to be alive in a test sandbox.
        assert!(!terminate(999999));
    }

    #[test]
    fn format_duration_variants() {
        assert_eq!(format_duration(-1), "-");
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m30s");
        assert_eq!(format_duration(3661), "1h1m");
    }

    #[test]
    fn uptime_secs_is_available_immediately_after_acquire() {
        let dir = TempDir::new().unwrap();
        let _guard = PidFile::acquire(dir.path()).unwrap();
        let secs = uptime_secs(dir.path()).unwrap();
        assert!(secs < 5);
    }

    #[test]
    fn uptime_secs_is_none_when_pid_file_absent() {
        let dir = TempDir::new().unwrap();
        assert_eq!(uptime_secs(dir.path()), None);
    }

    #[test]
    fn stale_pid_is_detected_and_replaceable() {
        let dir = TempDir::new().unwrap();
        // PID 999999 is exceedingly unlikely to be alive in a test sandbox.
        fs::write(dir.path().join("soba.pid"), "999999\n").unwrap();
        assert_eq!(
            probe(dir.path()).unwrap(),
            PidStatus::Stale { pid: 999999 }
        );
        // acquire() should succeed by overwriting the stale file.
        let _guard = PidFile::acquire(dir.path()).unwrap();
        assert_eq!(
            probe(dir.path()).unwrap(),
            PidStatus::Running {
                pid: std::process::id()
            }
        );
    }
}
