//! Bounded execution of external commands.
//!
//! Every kernel and scripting-bridge invocation (`pfctl`, `dscacheutil`,
//! `osascript`, `dig`) goes through here: stdin closed, output captured,
//! wall-clock bounded. A hung helper must never wedge the agent.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

/// Errors from external command execution.
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// The command could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran past its deadline and was killed.
    #[error("{program} timed out after {timeout:?}")]
    Timeout {
        /// Program name.
        program: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The command exited non-zero.
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        /// Program name.
        program: String,
        /// Exit code, if any.
        code: Option<i32>,
        /// Captured stderr, trimmed.
        stderr: String,
    },
}

/// Runs a command to completion with a deadline, returning its stdout.
///
/// # Errors
///
/// Returns [`CmdError`] on spawn failure, timeout, or non-zero exit.
pub async fn run(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<String, CmdError> {
    debug!(program, ?args, "running external command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CmdError::Spawn {
                program: program.to_string(),
                source,
            });
        },
        Err(_) => {
            return Err(CmdError::Timeout {
                program: program.to_string(),
                timeout,
            });
        },
    };

    if !output.status.success() {
        return Err(CmdError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Runs a best-effort command: failures are logged at `warn` and swallowed.
///
/// Returns whether the command succeeded.
pub async fn run_best_effort(program: &str, args: &[&str], timeout: Duration) -> bool {
    match run(program, args, timeout).await {
        Ok(_) => true,
        Err(e) => {
            warn!(program, error = %e, "best-effort command failed");
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = run("echo", &["hello"], Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = run("false", &[], Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CmdError::Failed { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run("definitely-not-a-real-binary", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CmdError::Spawn { .. }));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let err = run("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CmdError::Timeout { .. }));
    }

    #[tokio::test]
    async fn best_effort_swallows_failure() {
        assert!(!run_best_effort("false", &[], Duration::from_secs(5)).await);
        assert!(run_best_effort("true", &[], Duration::from_secs(5)).await);
    }
}
