//! # gitbak - dotfile backup into a git repository
//!
//! A library for mirroring user-chosen configuration files and directories
//! into a backup root, and for putting them back later with their metadata
//! intact.
//!
//! ## Overview
//!
//! gitbak treats a set of named applications, each with a list of paths, as
//! the unit of backup. It can:
//! - Copy every configured file or directory tree to `<backup-root>/<app>/<basename>`
//! - Exclude entries with ordered, gitignore-style rules
//! - Run a shell hook per application before copying (to dump state into a file)
//! - Record owner, group, mode, modification time and extended attributes in a
//!   manifest, since git keeps none of them
//! - Restore everything to its original location, asking what to do with
//!   files that already exist
//! - Commit and push the backup root
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gitbak::{BackupBuilder, Config, RestoreBuilder, FixedResolver, Resolution};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(Path::new("/home/me/.config/gitbak/gitbak.json"))?;
//!
//! // Mirror everything into the backup root and write the manifest
//! let report = BackupBuilder::new(config.clone()).parallel(true).build().run()?;
//! println!("Backed up {} files", report.files_copied());
//!
//! // Later, on a new machine
//! let restored = RestoreBuilder::new(config)
//!     .conflict_resolver(Box::new(FixedResolver(Resolution::BackupAside)))
//!     .build()
//!     .run()?;
//! println!("Restored {} paths", restored.restored());
//! # Ok(())
//! # }
//! ```
//!
//! ## Ignore rules
//!
//! ```rust
//! use gitbak::IgnoreRules;
//! use std::path::Path;
//!
//! let rules = IgnoreRules::new(&["*.log", "!important.log", "node_modules/"]).unwrap();
//! assert!(rules.matches(Path::new("/home/me/app/debug.log"), false).ignored);
//! assert!(!rules.matches(Path::new("/home/me/app/important.log"), false).ignored);
//! assert!(rules.matches(Path::new("/home/me/web/node_modules"), true).ignored);
//! ```
//!
//! The last rule matching a path decides whether it is ignored; see
//! [`patterns`] for the exact semantics.
//!
//! ## Backup layout
//!
//! ```text
//! <backup-root>/
//! ├── .gitbak_metadata.json      # manifest, rewritten by every successful backup
//! ├── nvim/
//! │   └── nvim/                  # ~/.config/nvim
//! │       ├── init.lua
//! │       └── lua/...
//! └── zsh/
//!     └── .zshrc                 # ~/.zshrc
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, GitbakError>`. Configuration problems
//! (an invalid ignore rule, an unknown application) abort a run before it
//! touches anything. Problems with single paths are collected: backup reports
//! them all at the end as [`GitbakError::BackupFailed`], restore reports them
//! per path in its [`RestoreReport`].
//!
//! ## Module Organization
//!
//! - [`patterns`]: Ignore rule compilation and matching
//! - [`copier`]: File and directory tree copying
//! - [`metadata`]: Metadata capture, restoration and the manifest
//! - [`backup`]: Backup orchestration
//! - [`restore`]: Restore orchestration and conflict resolution
//! - [`config`]: The JSON configuration file
//! - [`paths`]: Home directory expansion and the backup rooting rule
//! - [`hooks`]: Pre-backup shell hooks
//! - [`vcs`]: Commit and push of the backup root
//! - [`types`]: Common types and data structures
//! - [`error`]: Error types and handling

// Public API modules
pub mod backup;
pub mod config;
pub mod copier;
pub mod error;
pub mod hooks;
pub mod metadata;
pub mod paths;
pub mod patterns;
pub mod restore;
pub mod types;
pub mod vcs;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use backup::{Backup, BackupBuilder};
pub use config::{AppConfig, Config};
pub use copier::TreeCopier;
pub use error::{GitbakError, Result};
pub use metadata::{apply_metadata, collect_metadata, NoXattrs, XattrProvider};
pub use paths::{FixedHome, HomeResolver, PathResolver};
pub use patterns::{should_ignore, IgnoreMatch, IgnoreRules};
pub use restore::{ConflictResolver, FixedResolver, Restore, RestoreBuilder, ScriptedResolver, StdinResolver};
pub use types::*;
pub use utils::format_bytes;
pub use vcs::{Committer, GitCommitter};
