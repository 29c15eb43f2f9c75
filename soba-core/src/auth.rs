//! Authentication preflight — confirms a usable GitHub credential exists
//! before the scheduler starts.
//!
//! Soba never talks to the GitHub API directly; the Issue Client shells out
//! to `gh`. This check exists so a missing credential fails fast at startup
//! (§7 "Authentication error", exit code 2) instead of surfacing many ticks
//! later as a string of failed `gh` invocations, mirroring the teacher's
//! `auth::preflight_auth` gate in front of its own worker loop.

use std::process::Command;

use crate::config::{AuthMethod, Config};
use crate::error::SobaError;

/// Is `gh` logged in? `gh auth status` exits non-zero when no account is
/// authenticated (or when `gh` itself is not installed).
fn gh_authenticated() -> bool {
    Command::new("gh")
        .args(["auth", "status"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Is `GITHUB_TOKEN` set to a non-empty value?
fn env_token_present() -> bool {
    std::env::var("GITHUB_TOKEN")
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

/// Check that `config.auth_method` has a usable credential. `Auto` accepts
/// either `gh` login or `GITHUB_TOKEN`, preferring `gh` per spec §6.
pub fn preflight_auth(config: &Config) -> Result<(), SobaError> {
    let ok = match config.auth_method {
        AuthMethod::Gh => gh_authenticated(),
        AuthMethod::Env => env_token_present(),
        AuthMethod::Auto => gh_authenticated() || env_token_present(),
    };

    if ok {
        Ok(())
    } else {
        Err(SobaError::Auth(
            "no usable GitHub credential found (run `gh auth login` or set GITHUB_TOKEN)"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // GITHUB_TOKEN is process-global; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn env_auth_method_succeeds_with_token_present() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GITHUB_TOKEN", "ghp_test_token");
        let mut config = Config::default();
        config.auth_method = AuthMethod::Env;
        assert!(preflight_auth(&config).is_ok());
        std::env::remove_var("GITHUB_TOKEN");
    }

    #[test]
    fn env_auth_method_fails_without_token() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("GITHUB_TOKEN");
        let mut config = Config::default();
        config.auth_method = AuthMethod::Env;
        let err = preflight_auth(&config).unwrap_err();
        assert!(matches!(err, SobaError::Auth(_)));
    }

    #[test]
    fn env_token_present_rejects_empty_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GITHUB_TOKEN", "");
        assert!(!env_token_present());
        std::env::remove_var("GITHUB_TOKEN");
    }
}
