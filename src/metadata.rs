//! Metadata capture, restoration and the manifest file
//!
//! Content and metadata travel separately: the copier moves bytes and
//! permission bits, while this module records what a plain copy into a git
//! repository loses (owner, group, extended attributes, exact modification
//! time) in a JSON manifest at the backup root, and puts it back on restore.
//!
//! ## Manifest format
//!
//! ```json
//! [
//!   {
//!     "path": "nvim/init.lua",
//!     "mode": 33188,
//!     "uid": 1000,
//!     "gid": 1000,
//!     "xattrs": [],
//!     "modified": "2024-05-01T10:00:00.123456789Z"
//!   }
//! ]
//! ```
//!
//! The whole file is rewritten on every successful backup; records are never
//! merged with a previous manifest.

use crate::error::{GitbakError, Result};
use crate::types::{FileMetadata, MetadataOutcome, Xattr, MANIFEST_FILE_NAME};
use crate::utils;
use chrono::{DateTime, SecondsFormat, Utc};
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Access to extended attributes
///
/// Platforms and filesystems differ widely in xattr support, so the
/// orchestrators take this as a capability. [`NoXattrs`] is the default.
pub trait XattrProvider: Send + Sync + fmt::Debug {
    /// List the attributes of `path` without following symlinks
    fn list(&self, path: &Path) -> io::Result<Vec<Xattr>>;

    /// Set one attribute on `path`
    fn apply(&self, path: &Path, xattr: &Xattr) -> io::Result<()>;
}

/// Provider that records nothing and applies nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoXattrs;

impl XattrProvider for NoXattrs {
    fn list(&self, _path: &Path) -> io::Result<Vec<Xattr>> {
        Ok(Vec::new())
    }

    fn apply(&self, _path: &Path, _xattr: &Xattr) -> io::Result<()> {
        Ok(())
    }
}

/// Provider backed by the operating system
#[cfg(all(unix, feature = "xattr"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemXattrs;

#[cfg(all(unix, feature = "xattr"))]
impl XattrProvider for SystemXattrs {
    fn list(&self, path: &Path) -> io::Result<Vec<Xattr>> {
        let mut attrs = Vec::new();
        for name in xattr::list(path)? {
            if let Some(value) = xattr::get(path, &name)? {
                attrs.push(Xattr {
                    name: name.to_string_lossy().into_owned(),
                    value: hex::encode(value),
                });
            }
        }
        Ok(attrs)
    }

    fn apply(&self, path: &Path, attr: &Xattr) -> io::Result<()> {
        let value = hex::decode(&attr.value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        xattr::set(path, &attr.name, &value)
    }
}

/// The provider the binary uses
///
/// [`SystemXattrs`] when built with the `xattr` feature, [`NoXattrs`]
/// otherwise.
pub fn default_xattr_provider() -> Arc<dyn XattrProvider> {
    #[cfg(all(unix, feature = "xattr"))]
    {
        Arc::new(SystemXattrs)
    }
    #[cfg(not(all(unix, feature = "xattr")))]
    {
        Arc::new(NoXattrs)
    }
}

/// Capture the metadata of `path`, recorded relative to `base`
///
/// Symlinks are described themselves, not their targets.
///
/// # Errors
///
/// - [`GitbakError::Io`] if the path cannot be inspected
/// - [`GitbakError::Internal`] if `path` is not below `base`
pub fn collect_metadata(path: &Path, base: &Path, xattrs: &dyn XattrProvider) -> Result<FileMetadata> {
    let meta = fs::symlink_metadata(path)?;
    let relative = utils::make_relative(path, base)?;
    let (uid, gid) = owner_of(&meta);

    let modified: DateTime<Utc> = meta.modified()?.into();
    let attrs = match xattrs.list(path) {
        Ok(attrs) => attrs,
        Err(e) => {
            warn!("Failed to list extended attributes of {:?}: {}", path, e);
            Vec::new()
        }
    };

    Ok(FileMetadata {
        path: utils::to_slash(&relative),
        mode: utils::get_mode(&meta),
        uid,
        gid,
        xattrs: attrs,
        modified: modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
    })
}

#[cfg(unix)]
fn owner_of(meta: &fs::Metadata) -> (u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.uid(), meta.gid())
}

#[cfg(not(unix))]
fn owner_of(_meta: &fs::Metadata) -> (u32, u32) {
    (0, 0)
}

/// Apply a recorded entry to `root/meta.path`
///
/// Order: permission bits (not for symlinks), owner and group, extended
/// attributes, modification time. Ownership changes refused for lack of
/// privilege and xattrs the filesystem rejects are reported as warnings in
/// the outcome; every other failure is an error.
pub fn apply_metadata(
    root: &Path,
    meta: &FileMetadata,
    dry_run: bool,
    xattrs: &dyn XattrProvider,
) -> Result<MetadataOutcome> {
    let target = root.join(&meta.path);
    let current = match fs::symlink_metadata(&target) {
        Ok(current) => current,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(GitbakError::MissingTarget(target));
        }
        Err(e) => return Err(e.into()),
    };

    let mut outcome = MetadataOutcome {
        target: target.clone(),
        applied: false,
        warnings: Vec::new(),
    };

    if dry_run {
        info!(
            "[dry-run] Apply metadata to {} (mode {:o}, owner {}:{})",
            target.display(),
            meta.permissions(),
            meta.uid,
            meta.gid
        );
        return Ok(outcome);
    }

    let is_symlink = current.file_type().is_symlink();
    // A symlink's recorded mode is meaningless on whatever replaced it
    if !is_symlink && !meta.is_symlink() {
        utils::set_permissions(&target, meta.permissions())?;
    }

    if let Some(warning) = apply_owner(&target, &current, meta)? {
        warn!("{}", warning);
        outcome.warnings.push(warning);
    }

    for attr in &meta.xattrs {
        if let Err(e) = xattrs.apply(&target, attr) {
            let warning = format!("Failed to set xattr {} on {:?}: {}", attr.name, target, e);
            warn!("{}", warning);
            outcome.warnings.push(warning);
        }
    }

    let modified = meta.modified_time()?;
    let mtime = FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
    let result = if is_symlink {
        filetime::set_symlink_file_times(&target, FileTime::from_last_access_time(&current), mtime)
    } else {
        filetime::set_file_mtime(&target, mtime)
    };
    result.map_err(|e| GitbakError::Timestamp {
        path: target.clone(),
        reason: e.to_string(),
    })?;

    outcome.applied = true;
    trace!("Applied metadata for {} to {:?}", meta.path, target);
    Ok(outcome)
}

/// Change owner and group, returning a warning when not permitted
#[cfg(unix)]
fn apply_owner(target: &Path, current: &fs::Metadata, meta: &FileMetadata) -> Result<Option<String>> {
    if owner_of(current) == (meta.uid, meta.gid) {
        return Ok(None);
    }
    match std::os::unix::fs::lchown(target, Some(meta.uid), Some(meta.gid)) {
        Ok(()) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Ok(Some(format!(
            "Skipping ownership {}:{} for {:?}: {}",
            meta.uid, meta.gid, target, e
        ))),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn apply_owner(_target: &Path, _current: &fs::Metadata, _meta: &FileMetadata) -> Result<Option<String>> {
    Ok(None)
}

/// Location of the manifest inside a backup root
pub fn manifest_path(backup_root: &Path) -> PathBuf {
    backup_root.join(MANIFEST_FILE_NAME)
}

/// Write the manifest, replacing any previous one atomically
pub fn save_manifest(backup_root: &Path, entries: &[FileMetadata]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    let path = manifest_path(backup_root);
    utils::atomic_write(&path, json.as_bytes())?;
    debug!("Wrote {} metadata records to {:?}", entries.len(), path);
    Ok(())
}

/// Read the manifest of a backup root
pub fn load_manifest(backup_root: &Path) -> Result<Vec<FileMetadata>> {
    let data = fs::read(manifest_path(backup_root))?;
    Ok(serde_json::from_slice(&data)?)
}

/// Manifest records keyed by path for prefix lookups
#[derive(Debug, Clone, Default)]
pub struct ManifestIndex {
    entries: BTreeMap<String, FileMetadata>,
}

impl ManifestIndex {
    /// Index a loaded manifest; a repeated path keeps its last record
    pub fn new(entries: Vec<FileMetadata>) -> Self {
        Self {
            entries: entries.into_iter().map(|m| (m.path.clone(), m)).collect(),
        }
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record for exactly `key`
    pub fn get(&self, key: &str) -> Option<&FileMetadata> {
        self.entries.get(key)
    }

    /// Record for `key` followed by every record below it, in path order
    ///
    /// `nvim/lua` matches `nvim/lua/x.lua` but not `nvim/lua.bak`.
    pub fn subtree<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a FileMetadata> + 'a {
        self.entries
            .range::<str, _>((Bound::Included(key), Bound::Unbounded))
            .take_while(move |(path, _)| path.starts_with(key))
            .filter(move |(path, _)| {
                path.len() == key.len() || path.as_bytes().get(key.len()) == Some(&b'/')
            })
            .map(|(_, meta)| meta)
    }
}
