// mailbackup/src/utils/process.rs
use anyhow::{Context, Result};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::errors::BackupError;

/// Runs an external command to completion, killing it when `limit` elapses.
///
/// Stdout/stdin redirections set by the caller are kept; stderr is always
/// captured so a failure can report it. A non-zero exit status is an error.
pub async fn run_with_timeout(mut command: Command, limit: Duration) -> Result<Output> {
    let program = command.as_std().get_program().to_string_lossy().to_string();
    command.stderr(Stdio::piped()).kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("Failed to execute {}", program))?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.with_context(|| format!("Failed to wait for {}", program))?,
        Err(_) => {
            tracing::error!(%program, secs = limit.as_secs(), "Command timed out, killed");
            return Err(BackupError::CommandTimedOut {
                program,
                secs: limit.as_secs(),
            }
            .into());
        }
    };

    if !output.status.success() {
        return Err(BackupError::CommandFailed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script).stdout(Stdio::piped());
        cmd
    }

    #[tokio::test]
    async fn test_successful_command_returns_output() -> anyhow::Result<()> {
        let output = run_with_timeout(sh("printf dumped"), Duration::from_secs(10)).await?;
        assert_eq!(output.stdout, b"dumped");
        Ok(())
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_command_failed() {
        let err = run_with_timeout(sh("echo broken >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap_err();
        match err.downcast_ref::<BackupError>() {
            Some(BackupError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_command_is_killed() {
        let err = run_with_timeout(sh("sleep 30"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackupError>(),
            Some(BackupError::CommandTimedOut { .. })
        ));
    }
}
