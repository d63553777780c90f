//! Path resolution and the backup rooting rule
//!
//! Configured paths may start with `~` or be relative; both are resolved
//! against a home directory supplied by a [`PathResolver`]. Orchestrators
//! receive the resolver as a capability instead of reading the process
//! environment, so tests can point `~` at a temporary directory.
//!
//! The rooting rule lives here too: a configured path `P` of application
//! `app` is stored at `<backup-root>/<app>/<basename(P)>`. Backup and restore
//! both go through [`backup_location`] and [`manifest_key`].

use crate::error::{GitbakError, Result};
use crate::utils;
use std::fmt;
use std::path::{Path, PathBuf};

/// Capability resolving `~` and relative paths
pub trait PathResolver: Send + Sync + fmt::Debug {
    /// The directory `~` stands for
    fn home_dir(&self) -> Result<PathBuf>;

    /// Expand a configured path to an absolute one
    ///
    /// `~` and `~/rest` expand into the home directory; any other relative
    /// path is taken relative to the home directory as well. Absolute paths
    /// are returned unchanged.
    fn expand(&self, raw: &str) -> Result<PathBuf> {
        Ok(expand_with_home(raw, &self.home_dir()?))
    }

    /// Expand only a leading `~`, leaving other strings untouched
    ///
    /// Used for hook commands, where a relative word is a program name and not
    /// a path under the home directory.
    fn expand_tilde(&self, raw: &str) -> Result<String> {
        if raw == "~" || raw.starts_with("~/") {
            let home = self.home_dir()?;
            Ok(format!("{}{}", home.display(), &raw[1..]))
        } else {
            Ok(raw.to_string())
        }
    }
}

/// Resolver backed by the current user's home directory
#[derive(Debug, Clone, Copy, Default)]
pub struct HomeResolver;

impl PathResolver for HomeResolver {
    fn home_dir(&self) -> Result<PathBuf> {
        dirs::home_dir()
            .ok_or_else(|| GitbakError::config("cannot determine the home directory"))
    }
}

/// Resolver with a fixed home directory
#[derive(Debug, Clone)]
pub struct FixedHome(PathBuf);

impl FixedHome {
    /// Use `home` wherever `~` appears
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self(home.into())
    }
}

impl PathResolver for FixedHome {
    fn home_dir(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

/// Expand `raw` against an explicit home directory
pub fn expand_with_home(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home.join(rest);
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

/// Where the backup of `source` for `app` lives
///
/// ```rust
/// # use gitbak::paths::backup_location;
/// # use std::path::{Path, PathBuf};
/// let dst = backup_location(Path::new("/backups"), "nvim", Path::new("/home/u/.config/nvim")).unwrap();
/// assert_eq!(dst, PathBuf::from("/backups/nvim/nvim"));
/// ```
pub fn backup_location(backup_root: &Path, app: &str, source: &Path) -> Result<PathBuf> {
    Ok(backup_root.join(app).join(utils::base_name(source)?))
}

/// Manifest path recorded for the root of `source`
///
/// Always `<app>/<basename>` with a forward slash, whatever the platform.
pub fn manifest_key(app: &str, source: &Path) -> Result<String> {
    Ok(format!("{}/{}", app, utils::base_name(source)?))
}
