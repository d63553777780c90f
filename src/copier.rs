//! Directory-tree and single-file copying
//!
//! [`TreeCopier`] reproduces a source file or directory tree under a
//! destination, preserving permission bits and modification times. Backups
//! use [`TreeCopier::copy_dir`], which consults [`IgnoreRules`] for every
//! entry below the root; restores use [`TreeCopier::restore_dir`], which
//! copies everything present in the backup.
//!
//! ## Single files
//!
//! A destination that does not exist yet is ambiguous: is it the container
//! directory or the exact file name? The two intents have their own entry
//! points, [`TreeCopier::copy_file_into`] and [`TreeCopier::copy_file_as`].
//! [`TreeCopier::copy_file`] keeps the probing behavior (existing directory or
//! trailing separator means container) for callers that want it.
//!
//! ## Failure model
//!
//! The first error aborts the walk and is returned; whatever was copied
//! before stays in place. Copies are idempotent, so re-running is the
//! recovery path.
//!
//! ## Dry run
//!
//! With [`CopyOptions::dry_run`] set, sources are read (metadata and directory
//! listings) but nothing is created, written or chmodded. Every intended
//! action is logged with a `[dry-run]` prefix.

use crate::error::{GitbakError, Result};
use crate::patterns::IgnoreRules;
use crate::types::{CopiedEntry, CopyOptions, CopyReport, TimestampPolicy};
use crate::utils;
use filetime::FileTime;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Copies files and directory trees
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeCopier {
    options: CopyOptions,
}

impl TreeCopier {
    /// Create a copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Whether this copier only reports intended actions
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Options in effect
    pub fn options(&self) -> CopyOptions {
        self.options
    }

    /// Copy a file, guessing the intent of `dst`
    ///
    /// `dst` is treated as a container when it already exists as a directory
    /// or ends with a path separator; otherwise it is the exact destination.
    /// Returns the path the file was (or would be) written to.
    pub fn copy_file(&self, src: &Path, dst: &Path) -> Result<PathBuf> {
        let ends_with_separator = dst
            .as_os_str()
            .to_string_lossy()
            .ends_with(std::path::is_separator);

        if dst.is_dir() || ends_with_separator {
            self.copy_file_into(src, dst)
        } else {
            self.copy_file_as(src, dst)?;
            Ok(dst.to_path_buf())
        }
    }

    /// Copy `src` into the directory `dst_dir`, keeping its file name
    ///
    /// `dst_dir` is created when missing. Returns the full destination path.
    pub fn copy_file_into(&self, src: &Path, dst_dir: &Path) -> Result<PathBuf> {
        let dst = dst_dir.join(utils::base_name(src)?);
        self.copy_file_as(src, &dst)?;
        Ok(dst)
    }

    /// Copy `src` to exactly `dst`, creating parent directories
    ///
    /// The destination ends up with the source's permission bits and, subject
    /// to the [`TimestampPolicy`], its modification time. Anything at `dst`
    /// that is not a regular file, a symbolic link included, is removed
    /// first. Returns the number of bytes written (0 in a dry run).
    pub fn copy_file_as(&self, src: &Path, dst: &Path) -> Result<u64> {
        let src_meta = fs::metadata(src)?;

        if self.options.dry_run {
            info!("[dry-run] CopyFile {} → {}", src.display(), dst.display());
            return Ok(0);
        }

        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mode = utils::get_permissions(&src_meta);
        // Never write through a link or into a directory left by an earlier run
        match fs::symlink_metadata(dst) {
            Ok(existing) if existing.is_file() => utils::ensure_owner_writable(dst)?,
            Ok(_) => remove_entry(dst)?,
            Err(_) => {}
        }

        let mut reader = File::open(src)?;
        let mut writer = create_with_mode(dst, mode)?;
        let bytes = io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;
        drop(writer);

        // An existing destination keeps its old mode through open(2)
        utils::set_permissions(dst, mode)?;
        self.preserve_mtime(&src_meta, dst)?;

        trace!("Copied {} bytes {:?} → {:?}", bytes, src, dst);
        Ok(bytes)
    }

    /// Copy a directory tree, skipping ignored entries
    ///
    /// `dst_dir` receives the contents of `src_dir` (not `src_dir` itself).
    /// Entries are visited in lexical order; an ignored directory is skipped
    /// together with everything below it, even if a later rule would have
    /// rescued something inside.
    ///
    /// # Errors
    ///
    /// - [`GitbakError::WalkDir`] if a directory cannot be listed
    /// - [`GitbakError::Io`] if an entry cannot be created or copied
    pub fn copy_dir(&self, src_dir: &Path, dst_dir: &Path, rules: &IgnoreRules) -> Result<CopyReport> {
        if self.options.dry_run {
            info!("[dry-run] CopyDir {} → {}", src_dir.display(), dst_dir.display());
        }
        self.walk_copy(src_dir, dst_dir, Some(rules))
    }

    /// Restore a single file to exactly `dst`
    ///
    /// Content is copied and the source's permission bits are applied to the
    /// destination, including when it already existed with other bits.
    pub fn restore_file(&self, src: &Path, dst: &Path) -> Result<u64> {
        let bytes = self.copy_file_as(src, dst)?;
        if !self.options.dry_run {
            let mode = utils::get_permissions(&fs::metadata(src)?);
            utils::set_permissions(dst, mode)?;
            info!("  [restored] {}", dst.display());
        }
        Ok(bytes)
    }

    /// Restore a directory tree without any filtering
    pub fn restore_dir(&self, src_dir: &Path, dst_dir: &Path) -> Result<CopyReport> {
        if self.options.dry_run {
            info!("[dry-run] Restore directory {} → {}", src_dir.display(), dst_dir.display());
        } else {
            info!("  [restoring directory] {}", dst_dir.display());
        }
        self.walk_copy(src_dir, dst_dir, None)
    }

    /// Shared walk for backup (with rules) and restore (without)
    fn walk_copy(&self, src_dir: &Path, dst_dir: &Path, rules: Option<&IgnoreRules>) -> Result<CopyReport> {
        let root_meta = fs::metadata(src_dir)?;
        if !root_meta.is_dir() {
            return Err(GitbakError::internal(format!(
                "{:?} is not a directory",
                src_dir
            )));
        }

        let mut report = CopyReport::default();
        // Directory modes are applied last so read-only directories can
        // still be filled
        let mut pending_modes: Vec<(PathBuf, u32)> = Vec::new();

        self.ensure_dir(dst_dir)?;
        pending_modes.push((dst_dir.to_path_buf(), utils::get_permissions(&root_meta)));

        let mut walker = WalkDir::new(src_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            let entry = next?;
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type();
            let is_dir = file_type.is_dir();
            let relative = utils::make_relative(path, src_dir)?;

            if let Some(rules) = rules {
                let decision = rules.matches(path, is_dir);
                if decision.ignored {
                    let kind = if is_dir { "directory" } else { "file" };
                    debug!(
                        "Ignored {} {} (globally ignored with \"{}\")",
                        kind,
                        relative.display(),
                        decision.rule.unwrap_or_default()
                    );
                    report.ignored += 1;
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }

            let target = dst_dir.join(&relative);

            if is_dir {
                self.ensure_dir(&target)?;
                pending_modes.push((target, utils::get_permissions(&entry.metadata()?)));
                report.dirs_created += 1;
            } else if file_type.is_symlink() {
                self.copy_symlink(path, &target)?;
                report.symlinks_created += 1;
            } else {
                report.bytes_copied += self.copy_file_as(path, &target)?;
                report.files_copied += 1;
            }

            report.entries.push(CopiedEntry {
                source: path.to_path_buf(),
                relative,
                is_dir,
            });
        }

        if !self.options.dry_run {
            for (dir, mode) in pending_modes.iter().rev() {
                utils::set_permissions(dir, *mode)?;
            }
        }

        debug!(
            "Copied {:?} → {:?}: {} files, {} dirs, {} ignored ({})",
            src_dir,
            dst_dir,
            report.files_copied,
            report.dirs_created,
            report.ignored,
            utils::format_bytes(report.bytes_copied)
        );
        Ok(report)
    }

    /// Create a directory (and parents) that the owner can write into
    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if self.options.dry_run {
            trace!("[dry-run] mkdir {}", dir.display());
            return Ok(());
        }
        match fs::symlink_metadata(dir) {
            Ok(existing) if existing.is_dir() => {}
            Ok(_) => remove_entry(dir)?,
            Err(_) => {}
        }
        fs::create_dir_all(dir)?;
        utils::ensure_owner_writable(dir)
    }

    /// Recreate a symbolic link instead of following it
    fn copy_symlink(&self, src: &Path, dst: &Path) -> Result<()> {
        let target = utils::read_symlink(src)?;
        if self.options.dry_run {
            info!("[dry-run] Symlink {} → {}", dst.display(), target.display());
            return Ok(());
        }
        if fs::symlink_metadata(dst).is_ok() {
            remove_entry(dst)?;
        }
        utils::create_symlink(&target, dst)
    }

    fn preserve_mtime(&self, src_meta: &fs::Metadata, dst: &Path) -> Result<()> {
        let mtime = FileTime::from_last_modification_time(src_meta);
        match filetime::set_file_mtime(dst, mtime) {
            Ok(()) => Ok(()),
            Err(e) => match self.options.timestamps {
                TimestampPolicy::BestEffort => {
                    warn!("Failed to preserve modification time of {:?}: {}", dst, e);
                    Ok(())
                }
                TimestampPolicy::FailHard => Err(GitbakError::Timestamp {
                    path: dst.to_path_buf(),
                    reason: e.to_string(),
                }),
            },
        }
    }
}

/// Remove whatever is at `path` without following a symbolic link
fn remove_entry(path: &Path) -> Result<()> {
    let existing = fs::symlink_metadata(path)?;
    trace!("Replacing existing entry at {:?}", path);
    if existing.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Open `path` for writing, creating it with `mode` when new
#[cfg(unix)]
fn create_with_mode(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode | 0o200)
        .open(path)
}

#[cfg(not(unix))]
fn create_with_mode(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}
