//! Core data types used throughout the gitbak library
//!
//! This module contains the data structures shared between the copy engine
//! and the orchestrators.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Persisted state**: `FileMetadata`, `Xattr` - records of the metadata manifest
//! - **Copy parameters**: `CopyOptions`, `TimestampPolicy`
//! - **Results**: `CopyReport`, `BackupReport`, `RestoreReport` and their per-item parts
//! - **Restore decisions**: `Resolution`
//!
//! ## Examples
//!
//! ```rust
//! use gitbak::types::{CopyOptions, TimestampPolicy};
//!
//! let options = CopyOptions {
//!     dry_run: true,
//!     timestamps: TimestampPolicy::FailHard,
//! };
//! assert!(options.dry_run);
//! ```

use crate::error::{GitbakError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name of the metadata manifest inside the backup root
pub const MANIFEST_FILE_NAME: &str = ".gitbak_metadata.json";

/// Infix used when a restore moves an existing destination aside
pub const RESTORE_STATE_INFIX: &str = ".gitbak-restore-state-";

/// An extended attribute attached to a file
///
/// The value is hex-encoded so arbitrary bytes survive the JSON manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Xattr {
    /// Attribute name, including its namespace (e.g. `user.origin`)
    pub name: String,
    /// Hex-encoded attribute value
    pub value: String,
}

/// Metadata recorded for one backed-up file or directory
///
/// One record exists per copied entry. The `path` is relative to the backup
/// root and always uses forward slashes, e.g. `nvim/init.lua` or
/// `nvim/lua/plugins.lua`.
///
/// # Examples
///
/// ```rust
/// # use gitbak::types::FileMetadata;
/// let meta = FileMetadata {
///     path: "ssh/config".to_string(),
///     mode: 0o100600,
///     uid: 1000,
///     gid: 1000,
///     xattrs: vec![],
///     modified: "2024-05-01T10:00:00.123456789Z".to_string(),
/// };
/// assert_eq!(meta.permissions(), 0o600);
/// assert!(!meta.is_dir());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Path relative to the backup root
    pub path: String,
    /// Raw mode including file type bits
    pub mode: u32,
    /// Owning user id
    pub uid: u32,
    /// Owning group id
    pub gid: u32,
    /// Extended attributes in the order they were listed
    #[serde(default)]
    pub xattrs: Vec<Xattr>,
    /// Modification time, RFC 3339 with nanosecond precision
    pub modified: String,
}

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

impl FileMetadata {
    /// Permission bits only (setuid/setgid/sticky included)
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Whether the record describes a directory
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Whether the record describes a symbolic link
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Parse the recorded modification time
    pub fn modified_time(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.modified)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| GitbakError::Timestamp {
                path: PathBuf::from(&self.path),
                reason: e.to_string(),
            })
    }

    /// Compare everything except the modification time
    ///
    /// Two backups of an unchanged tree must agree on these fields.
    pub fn same_attributes(&self, other: &FileMetadata) -> bool {
        self.path == other.path
            && self.mode == other.mode
            && self.uid == other.uid
            && self.gid == other.gid
            && self.xattrs == other.xattrs
    }
}

/// What to do when a modification time cannot be preserved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampPolicy {
    /// Log a warning and keep going
    #[default]
    BestEffort,
    /// Fail the copy of that entry
    FailHard,
}

/// Options shared by every copy performed during one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Only report intended actions, never touch the filesystem
    pub dry_run: bool,
    /// How to treat timestamp preservation failures
    pub timestamps: TimestampPolicy,
}

/// One entry reproduced by a tree copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedEntry {
    /// Absolute path of the source entry
    pub source: PathBuf,
    /// Path relative to the copied root
    pub relative: PathBuf,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// Result of a tree copy
///
/// Entries are listed in walk order (lexical, parents before children).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyReport {
    /// Entries copied (or that would be copied in a dry run)
    pub entries: Vec<CopiedEntry>,
    /// Number of regular files copied
    pub files_copied: usize,
    /// Number of directories created below the root
    pub dirs_created: usize,
    /// Number of symbolic links recreated
    pub symlinks_created: usize,
    /// Total bytes written
    pub bytes_copied: u64,
    /// Number of entries skipped by ignore rules
    pub ignored: usize,
}

/// Lifecycle of one application during a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    /// Not started yet
    Pending,
    /// Pre-backup hook is executing
    HookRunning,
    /// Paths are being copied
    CopyingPaths,
    /// All paths processed without error
    Done,
    /// Hook failed or at least one path failed to copy
    Failed,
}

/// Result of backing up one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppOutcome {
    /// Application name
    pub app: String,
    /// Final state
    pub state: AppState,
    /// Configured paths that were copied
    pub paths_copied: usize,
    /// Configured paths skipped (missing or ignored)
    pub paths_skipped: usize,
    /// Regular files written across all paths
    pub files_copied: usize,
    /// Bytes written across all paths
    pub bytes_copied: u64,
    /// Error messages, already prefixed with the application name
    pub errors: Vec<String>,
    /// Metadata collected for this application, in discovery order
    pub metadata: Vec<FileMetadata>,
}

impl AppOutcome {
    /// Create a pending outcome for an application
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            state: AppState::Pending,
            paths_copied: 0,
            paths_skipped: 0,
            files_copied: 0,
            bytes_copied: 0,
            errors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    /// Record an error and mark the application failed
    pub fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.state = AppState::Failed;
    }

    /// Whether the application finished without errors
    pub fn succeeded(&self) -> bool {
        self.state == AppState::Done
    }
}

/// Result of a backup run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupReport {
    /// Per-application outcomes, sorted by application name
    pub apps: Vec<AppOutcome>,
    /// Number of metadata records collected
    pub entries: usize,
    /// Whether the manifest was written
    pub manifest_written: bool,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl BackupReport {
    /// Total files copied across applications
    pub fn files_copied(&self) -> usize {
        self.apps.iter().map(|a| a.files_copied).sum()
    }

    /// Total bytes copied across applications
    pub fn bytes_copied(&self) -> u64 {
        self.apps.iter().map(|a| a.bytes_copied).sum()
    }
}

/// Operator decision for a restore destination that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Leave the destination untouched
    Skip,
    /// Restore on top of the destination
    Overwrite,
    /// Rename the destination aside, then restore
    BackupAside,
}

impl Resolution {
    /// Parse an operator answer
    ///
    /// Accepts `s`, `o` and `b` in any case, surrounding whitespace ignored.
    /// Anything else means skip.
    ///
    /// ```rust
    /// # use gitbak::types::Resolution;
    /// assert_eq!(Resolution::parse("O\n"), Resolution::Overwrite);
    /// assert_eq!(Resolution::parse(" b "), Resolution::BackupAside);
    /// assert_eq!(Resolution::parse("yes"), Resolution::Skip);
    /// ```
    pub fn parse(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "o" => Resolution::Overwrite,
            "b" => Resolution::BackupAside,
            _ => Resolution::Skip,
        }
    }
}

/// Result of restoring one configured path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathOutcome {
    /// Content was restored
    Restored {
        /// Backup-side source
        from: PathBuf,
        /// Original location written to
        to: PathBuf,
        /// Where a pre-existing destination was moved, if it was
        aside: Option<PathBuf>,
    },
    /// Destination existed and the operator chose to skip
    Skipped {
        /// Original location left untouched
        path: PathBuf,
    },
    /// Nothing was found in the backup for this path
    NotFound {
        /// Original location
        path: PathBuf,
        /// Last backup location tried
        tried: PathBuf,
    },
    /// Dry run: what would have been restored
    DryRun {
        /// Backup-side source
        from: PathBuf,
        /// Original location
        to: PathBuf,
    },
    /// Restore of this path failed
    Failed {
        /// Configured path
        path: PathBuf,
        /// Error message
        error: String,
    },
}

/// Restore results for one application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppRestore {
    /// Application name
    pub app: String,
    /// One outcome per configured path, in configuration order
    pub paths: Vec<PathOutcome>,
}

/// Result of a restore run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Per-application results
    pub apps: Vec<AppRestore>,
    /// Non-fatal problems (manifest unavailable, metadata not applied, ...)
    pub warnings: Vec<String>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl RestoreReport {
    /// Number of paths whose content was restored
    pub fn restored(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, PathOutcome::Restored { .. }))
            .count()
    }

    /// Number of paths that failed or were not found
    pub fn failures(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, PathOutcome::Failed { .. } | PathOutcome::NotFound { .. }))
            .count()
    }

    /// Iterate over every path outcome
    pub fn outcomes(&self) -> impl Iterator<Item = &PathOutcome> {
        self.apps.iter().flat_map(|a| a.paths.iter())
    }
}

/// Result of applying one metadata record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOutcome {
    /// Absolute path the record was applied to
    pub target: PathBuf,
    /// Whether anything was changed (false in dry run)
    pub applied: bool,
    /// Non-fatal problems, e.g. ownership refused for lack of privilege
    pub warnings: Vec<String>,
}
