//! Pre-backup hooks
//!
//! An application may name a shell command to run before its paths are
//! copied, typically to dump state into a file that is part of the backup
//! (`brew bundle dump`, `crontab -l > ~/.crontab`). The command runs through
//! `bash -c` in the current working directory; its output is captured and
//! logged line by line under the application's name.

use crate::error::{GitbakError, Result};
use std::fmt;
use std::process::{Command, Output};
use tracing::{info, warn};

/// Captured result of one hook execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
    /// Whether the command exited with status 0
    pub success: bool,
    /// Exit code, if the command was not killed by a signal
    pub code: Option<i32>,
}

impl From<Output> for HookOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Executes hook commands
///
/// Only spawn failures are errors; a command that runs and exits non-zero is
/// reported through [`HookOutput::success`].
pub trait HookRunner: Send + Sync + fmt::Debug {
    /// Run `command` to completion and capture its output
    fn run(&self, command: &str) -> std::io::Result<HookOutput>;
}

/// Runs hooks through a shell (`bash -c` by default)
#[derive(Debug, Clone)]
pub struct ShellHookRunner {
    shell: String,
}

impl ShellHookRunner {
    /// Use a different shell; it must accept `-c <command>`
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }
}

impl Default for ShellHookRunner {
    fn default() -> Self {
        Self::with_shell("bash")
    }
}

impl HookRunner for ShellHookRunner {
    fn run(&self, command: &str) -> std::io::Result<HookOutput> {
        let output = Command::new(&self.shell).arg("-c").arg(command).output()?;
        Ok(HookOutput::from(output))
    }
}

/// Run the pre-backup hook of `app` and log its output
///
/// In a dry run the command is only logged. Output lines are logged even
/// when the command fails, so the operator sees why.
///
/// # Errors
///
/// - [`GitbakError::HookFailed`] if the command cannot be spawned or exits
///   unsuccessfully
pub fn run_pre_backup_hook(runner: &dyn HookRunner, app: &str, command: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("[dry-run] {}: Would run pre-backup script: {}", app, command);
        return Ok(());
    }

    info!("{}: Running pre-backup script: {}", app, command);
    let output = runner.run(command).map_err(|e| GitbakError::HookFailed {
        app: app.to_string(),
        reason: e.to_string(),
    })?;

    for line in output.stdout.trim().lines() {
        info!("{}: pre-backup stdout: {}", app, line);
    }
    for line in output.stderr.trim().lines() {
        warn!("{}: pre-backup stderr: {}", app, line);
    }

    if output.success {
        Ok(())
    } else {
        let reason = match output.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        Err(GitbakError::HookFailed {
            app: app.to_string(),
            reason,
        })
    }
}
