//! Commit-and-push of the backup root
//!
//! After a successful backup the binary stages everything in the backup
//! root, commits it with a timestamped message and pushes. The repository,
//! its remote and credentials are expected to be set up already.

use crate::error::{GitbakError, Result};
use chrono::Local;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Versions the backup root after a run
pub trait Committer: Send + Sync + fmt::Debug {
    /// Record the current state of `root`
    fn commit_and_push(&self, root: &Path, dry_run: bool) -> Result<()>;
}

/// Commit message for a backup taken now
pub fn commit_message() -> String {
    format!("gitbak backup: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

/// Runs `git add -A`, `git commit` and `git push` in the backup root
#[derive(Debug, Clone)]
pub struct GitCommitter {
    program: String,
}

impl GitCommitter {
    /// Use another executable in place of `git`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn step(&self, root: &Path, step: &str, args: &[&str]) -> Result<()> {
        debug!("Running {} -C {} {}", self.program, root.display(), args.join(" "));
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(root)
            .args(args)
            .output()
            .map_err(|e| GitbakError::Vcs {
                step: step.to_string(),
                output: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(GitbakError::Vcs {
            step: step.to_string(),
            output: format!("{} - {}", output.status, combined.trim()),
        })
    }
}

impl Default for GitCommitter {
    fn default() -> Self {
        Self::with_program("git")
    }
}

impl Committer for GitCommitter {
    fn commit_and_push(&self, root: &Path, dry_run: bool) -> Result<()> {
        let message = commit_message();
        if dry_run {
            info!("[dry-run] {} -C {} add -A", self.program, root.display());
            info!("[dry-run] {} -C {} commit -m \"{}\"", self.program, root.display(), message);
            info!("[dry-run] {} -C {} push", self.program, root.display());
            return Ok(());
        }

        self.step(root, "add", &["add", "-A"])?;
        self.step(root, "commit", &["commit", "-m", &message])?;
        self.step(root, "push", &["push"])?;
        info!("Committed and pushed {}", root.display());
        Ok(())
    }
}
