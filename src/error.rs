//! Error types for the gitbak library
//!
//! This module defines all error types that can occur while backing up and
//! restoring files. Errors carry enough context (paths, application names,
//! offending patterns) for the operator to act on them without re-running
//! with extra logging.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the gitbak library
pub type Result<T> = std::result::Result<T, GitbakError>;

/// Main error type for all gitbak operations
#[derive(Debug, Error)]
pub enum GitbakError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Malformed ignore rule
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rule as written in the configuration
        pattern: String,
        /// Why the glob compiler rejected it
        reason: String,
    },

    /// Invalid or unreadable configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Metadata target does not exist
    #[error("Target does not exist: {0:?}")]
    MissingTarget(PathBuf),

    /// No backed-up counterpart for a configured path
    #[error("Backup not found: {name} (tried {tried:?})")]
    BackupNotFound {
        /// Base name of the configured path
        name: String,
        /// Last location that was tried
        tried: PathBuf,
    },

    /// Pre-backup hook exited unsuccessfully
    #[error("{app}: pre-backup script failed: {reason}")]
    HookFailed {
        /// Application owning the hook
        app: String,
        /// Exit status or spawn failure
        reason: String,
    },

    /// One or more applications failed during backup
    #[error("errors during backup: {}", .0.join("; "))]
    BackupFailed(Vec<String>),

    /// Application name not present in the configuration
    #[error("Unknown application: {0}")]
    UnknownApp(String),

    /// Version-control step failed
    #[error("git {step} failed: {output}")]
    Vcs {
        /// Which git subcommand failed
        step: String,
        /// Combined stdout/stderr of the failed command
        output: String,
    },

    /// Timestamp parsing or preservation error
    #[error("Timestamp error for {path:?}: {reason}")]
    Timestamp {
        /// File whose timestamp could not be handled
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Path conversion error
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GitbakError {
    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl ToString) -> Self {
        GitbakError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        GitbakError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        GitbakError::Internal(msg.into())
    }

    /// Check if this error is a configuration problem
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GitbakError::InvalidPattern { .. }
                | GitbakError::InvalidConfiguration(_)
                | GitbakError::UnknownApp(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            GitbakError::InvalidPattern { pattern, reason } => {
                format!(
                    "Ignore rule '{}' in global_ignores is not a valid glob ({}). Fix or remove it and re-run.",
                    pattern, reason
                )
            }
            GitbakError::UnknownApp(app) => {
                format!(
                    "Application '{}' is not configured. Use 'gitbak add --app {} --path <path>' first.",
                    app, app
                )
            }
            GitbakError::BackupFailed(errors) => {
                format!(
                    "{} error(s) during backup; the metadata manifest was not updated:\n  {}",
                    errors.len(),
                    errors.join("\n  ")
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GitbakError::UnknownApp("ssh".to_string());
        assert_eq!(err.to_string(), "Unknown application: ssh");

        let err = GitbakError::invalid_pattern("[a-", "unclosed class");
        assert_eq!(err.to_string(), "Invalid ignore pattern '[a-': unclosed class");
    }

    #[test]
    fn test_backup_failed_joins_messages() {
        let err = GitbakError::BackupFailed(vec!["a: boom".to_string(), "b: bang".to_string()]);
        assert_eq!(err.to_string(), "errors during backup: a: boom; b: bang");
        assert!(err.user_message().starts_with("2 error(s) during backup"));
    }

    #[test]
    fn test_error_classification() {
        assert!(GitbakError::config("bad").is_configuration());
        assert!(!GitbakError::MissingTarget(PathBuf::from("/x")).is_configuration());
        assert!(GitbakError::invalid_pattern("[", "x").is_configuration());
        assert!(!GitbakError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "test"
        ))
        .is_configuration());
    }
}
