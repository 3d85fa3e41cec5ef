//! Lifecycle hook commands.
//!
//! Operators attach shell commands to the four tunnel lifecycle points
//! (before/after connect and disconnect), typically to configure addresses
//! or routes on the virtual interface.  The literal `{{.dev}}` placeholder
//! in a command is replaced with the open device's name before the command
//! runs under `/bin/sh -c`.  Command output is discarded; only the exit
//! status matters.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Placeholder replaced with the device name in hook command templates.
pub const DEVICE_PLACEHOLDER: &str = "{{.dev}}";

/// Hook command failures.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to spawn hook command: {0}")]
    Spawn(std::io::Error),

    #[error("hook command exited with {0}")]
    Failed(std::process::ExitStatus),
}

/// Capability for running lifecycle hook commands.
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Runs one hook command template against the named device.
    ///
    /// # Errors
    ///
    /// [`HookError::Spawn`] when the shell cannot start and
    /// [`HookError::Failed`] on a non-zero exit status.
    async fn run(&self, template: &str, device: &str) -> Result<(), HookError>;
}

/// Runs hooks under the system shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellHookRunner;

impl ShellHookRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HookRunner for ShellHookRunner {
    async fn run(&self, template: &str, device: &str) -> Result<(), HookError> {
        let command = template.replace(DEVICE_PLACEHOLDER, device);
        debug!("running hook command: {command}");

        let status = Command::new("/bin/sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(HookError::Spawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(HookError::Failed(status))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_command_reports_ok() {
        let runner = ShellHookRunner::new();
        assert!(runner.run("true", "tap0").await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_its_status() {
        // Arrange
        let runner = ShellHookRunner::new();

        // Act
        let result = runner.run("false", "tap0").await;

        // Assert
        assert!(matches!(result, Err(HookError::Failed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_device_placeholder_is_substituted() {
        // Arrange: the command succeeds only when it sees the device name
        let runner = ShellHookRunner::new();

        // Act / Assert
        assert!(runner
            .run("[ {{.dev}} = tap3 ]", "tap3")
            .await
            .is_ok());
        assert!(runner
            .run("[ {{.dev}} = tap3 ]", "tap7")
            .await
            .is_err());
    }
}
