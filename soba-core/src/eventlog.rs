//! Structured JSONL event log for the daemon.
//!
//! Writes one JSON object per line to `<state_dir>/logs/daemon.log`, making
//! progress observable via `tail -f` without duplicating stdout.
//!
//! ## Event types
//!
//! | `event`            | When                                               |
//! |---------------------|----------------------------------------------------|
//! | `tick_start`        | A scheduler tick begins                           |
//! | `tick_end`          | A scheduler tick ends                              |
//! | `issue_dispatch`    | A phase process is about to be spawned             |
//! | `issue_skipped`     | An Issue was classified but not selected this tick |
//! | `label_conflict`    | A label swap lost the race to another actor        |
//! | `stranded_issue`    | Startup reconciliation found an orphaned Issue     |
//! | `error`             | A non-fatal error during the tick                  |

use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// Handle to the structured daemon event log.
///
/// Writes are best-effort — errors are silently ignored so that a broken log
/// path never disrupts the scheduler's tick loop.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Open (or create) the daemon log at `<state_dir>/logs/daemon.log`.
    pub fn open(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("logs").join("daemon.log"),
        }
    }

    /// Append a JSON event object to the log file (one line per event). The
    /// `ts` field (ISO-8601 UTC timestamp) is injected automatically.
    pub fn emit(&self, mut event: Value) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Some(obj) = event.as_object_mut() {
            obj.insert(
                "ts".to_string(),
                Value::String(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            );
        }
        let mut line = event.to_string();
        line.push('\n');
        if let Ok(mut f) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            let _ = f.write_all(line.as_bytes());
        }
    }

    pub fn tick_start(&self, tick: u64) {
        self.emit(json!({"event": "tick_start", "tick": tick}));
    }

    pub fn tick_end(&self, tick: u64, transitioned: Option<u64>) {
        self.emit(json!({"event": "tick_end", "tick": tick, "transitioned": transitioned}));
    }

    pub fn issue_dispatch(&self, issue: u64, phase: &str, session: &str) {
        self.emit(json!({
            "event": "issue_dispatch",
            "issue": issue,
            "phase": phase,
            "session": session,
        }));
    }

    pub fn issue_skipped(&self, issue: u64, reason: &str) {
        self.emit(json!({
            "event": "issue_skipped",
            "issue": issue,
            "reason": reason,
        }));
    }

    pub fn label_conflict(&self, issue: u64, from: &str, to: &str) {
        self.emit(json!({
            "event": "label_conflict",
            "issue": issue,
            "from": from,
            "to": to,
        }));
    }

    pub fn stranded_issue(&self, issue: u64, label: &str) {
        self.emit(json!({
            "event": "stranded_issue",
            "issue": issue,
            "label": label,
        }));
    }

    pub fn error(&self, message: &str) {
        self.emit(json!({
            "event": "error",
            "message": message,
        }));
    }

    /// Read the last `n` lines of the log (used by `soba status`).
    pub fn tail(&self, n: usize) -> Vec<String> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return vec![];
        };
        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|s| s.to_string()).collect()
    }
}
