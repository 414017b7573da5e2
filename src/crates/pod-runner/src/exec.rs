//! One-shot subprocess invocations
//!
//! For short auxiliary commands (help-text extraction, git metadata) that
//! must never hang the runtime: a hard 5 second timeout, after which the
//! process is killed.

use pod_core::error::{PodError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Hard timeout for one-shot invocations
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a command to completion and return its stdout as UTF-8
///
/// Fails on spawn error, non-zero exit, or timeout.
pub async fn exec_with_timeout(program: &str, args: &[&str]) -> Result<String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PodError::Subprocess(format!("failed to spawn {}: {}", program, e)))?;

    let output = tokio::time::timeout(EXEC_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| {
            PodError::Subprocess(format!(
                "{} timed out after {}s",
                program,
                EXEC_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| PodError::Subprocess(format!("{} failed: {}", program, e)))?;

    if !output.status.success() {
        return Err(PodError::Subprocess(format!(
            "{} exited with {}",
            program, output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = exec_with_timeout("echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = exec_with_timeout("false", &[]).await.unwrap_err();
        assert!(matches!(err, PodError::Subprocess(_)));
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        assert!(exec_with_timeout("definitely-not-a-binary", &[])
            .await
            .is_err());
    }
}
