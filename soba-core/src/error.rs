//! Error taxonomy for soba.
//!
//! The scheduler only ever terminates the process for [`SobaError::Config`]
//! or [`SobaError::Auth`] — every other variant is logged and the current
//! tick's operation is simply abandoned (see `scheduler.rs`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SobaError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("transient remote error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("label conflict: expected `{from}` but it was already gone")]
    Conflict { from: String },

    #[error("process spawn failure: {0}")]
    SpawnFailure(#[source] anyhow::Error),

    #[error("issue #{issue_num} is stranded in `{label}` with no live session")]
    Stranded { issue_num: u64, label: String },
}

impl SobaError {
    /// Exit code a daemon-startup failure should use. Only `Config` and
    /// `Auth` ever reach `main`; other variants are handled per-tick.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Auth(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_auth_exit_with_code_two() {
        assert_eq!(SobaError::Config("bad".into()).exit_code(), 2);
        assert_eq!(SobaError::Auth("no token".into()).exit_code(), 2);
    }

    #[test]
    fn other_variants_exit_with_code_one() {
        assert_eq!(
            SobaError::Conflict {
                from: "soba:todo".into()
            }
            .exit_code(),
            1
        );
        assert_eq!(
            SobaError::Stranded {
                issue_num: 4,
                label: "soba:doing".into()
            }
            .exit_code(),
            1
        );
    }
}
