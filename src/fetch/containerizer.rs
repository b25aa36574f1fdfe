//! Running build commands inside a build root.
//!
//! The containerizer is configured as a command prefix. `{rootfs}` in the
//! prefix is replaced by the build root and the build command is appended:
//!
//! ```toml
//! [containerizer]
//! command = ["podman", "run", "--rm", "--rootfs", "{rootfs}"]
//! ```
//!
//! With an empty prefix the build command runs directly on the host, with
//! the build root as its working directory. Either way `PPPACKAGE_ROOTFS`
//! points at the build root.

use crate::constants::{DEFAULT_BUILD_TIMEOUT, ROOTFS_ENV, ROOTFS_PLACEHOLDER};
use crate::core::PpError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Containerizer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerizerConfig {
    /// Command prefix; empty runs build commands directly
    #[serde(default)]
    pub command: Vec<String>,
    /// Directory build roots are created in; defaults to the system temp dir
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

/// Output of a finished build command.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

/// Runs build commands according to a [`ContainerizerConfig`].
#[derive(Debug, Clone)]
pub struct Containerizer {
    config: ContainerizerConfig,
    timeout: Option<Duration>,
}

impl Containerizer {
    /// A containerizer with the default build timeout.
    pub fn new(config: ContainerizerConfig) -> Self {
        Self {
            config,
            timeout: Some(DEFAULT_BUILD_TIMEOUT),
        }
    }

    /// Overrides the build timeout (`None` waits forever).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout = duration;
        self
    }

    /// Directory new build roots are created in.
    pub fn workdir(&self) -> PathBuf {
        self.config.workdir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Full argument vector for running `command` in `rootfs`.
    pub fn command_line(&self, rootfs: &Path, command: &[String]) -> Vec<String> {
        let rootfs = rootfs.display().to_string();
        self.config
            .command
            .iter()
            .map(|arg| arg.replace(ROOTFS_PLACEHOLDER, &rootfs))
            .chain(command.iter().cloned())
            .collect()
    }

    /// Runs `command` with `rootfs` as the build root.
    ///
    /// The child is killed if the returned future is dropped.
    ///
    /// # Errors
    ///
    /// [`PpError::BackendCommandFailure`] carrying stderr when the command
    /// exits unsuccessfully or times out.
    pub async fn run(&self, rootfs: &Path, command: &[String]) -> Result<BuildOutput> {
        let args = self.command_line(rootfs, command);
        let Some((program, rest)) = args.split_first() else {
            return Err(PpError::ConfigError {
                message: "build command is empty".to_string(),
            }
            .into());
        };

        tracing::debug!(target: "containerizer", "Executing command: {}", args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .current_dir(rootfs)
            .env(ROOTFS_ENV, rootfs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout {
            match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "containerizer",
                        "Command timed out after {} seconds: {}",
                        duration.as_secs(),
                        args.join(" ")
                    );
                    return Err(PpError::BackendCommandFailure {
                        operation: format!("build command '{program}'"),
                        message: format!("timed out after {} seconds", duration.as_secs()),
                    }
                    .into());
                }
            }
        } else {
            output_future.await
        }
        .with_context(|| format!("Failed to execute {}", args.join(" ")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::debug!(target: "containerizer", "Command failed with exit code: {:?}", output.status.code());
            return Err(PpError::BackendCommandFailure {
                operation: format!("build command '{program}'"),
                message: format!(
                    "exited with {}: {}",
                    output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                ),
            }
            .into());
        }

        tracing::trace!(target: "containerizer", "Command completed successfully");
        Ok(BuildOutput {
            stdout,
            stderr,
        })
    }
}
