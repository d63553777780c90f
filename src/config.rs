//! The `gitbak.json` configuration file
//!
//! ```json
//! {
//!   "backup_dir": "~/dotfiles-backup",
//!   "custom_apps": {
//!     "nvim": { "paths": ["~/.config/nvim"] },
//!     "brew": {
//!       "paths": ["~/Brewfile"],
//!       "pre_backup_script": "brew bundle dump --force --file ~/Brewfile"
//!     }
//!   },
//!   "global_ignores": ["*.log", "!important.log", ".DS_Store", "node_modules/"]
//! }
//! ```
//!
//! Applications are kept in a [`BTreeMap`], so every run visits them in name
//! order and a saved file is stable across edits.

use crate::error::{GitbakError, Result};
use crate::paths::PathResolver;
use crate::patterns::IgnoreRules;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default configuration location, `~`-relative
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/gitbak/gitbak.json";

/// Paths and hook of one application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Files or directories to back up, possibly `~`-relative
    #[serde(default)]
    pub paths: Vec<String>,
    /// Shell command run before the paths are copied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_backup_script: Option<String>,
}

impl AppConfig {
    /// The hook command, treating an empty string as absent
    pub fn hook(&self) -> Option<&str> {
        self.pre_backup_script
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty())
    }
}

/// Whole configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Backup root; may be `~`-relative
    pub backup_dir: String,
    /// Applications by name
    #[serde(default)]
    pub custom_apps: BTreeMap<String, AppConfig>,
    /// Ordered ignore rules applied to every application
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_ignores: Vec<String>,
}

impl Config {
    /// Read and parse a configuration file
    ///
    /// # Errors
    ///
    /// - [`GitbakError::InvalidConfiguration`] if the file cannot be read or
    ///   is not valid JSON
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .map_err(|e| GitbakError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_slice(&data)
            .map_err(|e| GitbakError::config(format!("cannot parse {}: {}", path.display(), e)))?;
        debug!(
            "Loaded configuration from {:?} ({} apps, {} ignore rules)",
            path,
            config.custom_apps.len(),
            config.global_ignores.len()
        );
        Ok(config)
    }

    /// Write the configuration as 2-space indented JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        utils::atomic_write(path, json.as_bytes())?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// The backup root as an absolute path
    pub fn backup_root(&self, resolver: &dyn PathResolver) -> Result<PathBuf> {
        if self.backup_dir.trim().is_empty() {
            return Err(GitbakError::config("backup_dir is empty"));
        }
        resolver.expand(&self.backup_dir)
    }

    /// Check the configuration before a run
    ///
    /// The backup root must exist and be a directory, application names must
    /// be usable as directory names and every ignore rule must compile.
    pub fn validate(&self, resolver: &dyn PathResolver) -> Result<()> {
        let root = self.backup_root(resolver)?;
        let meta = fs::metadata(&root).map_err(|e| {
            GitbakError::config(format!("backup_dir {} is not accessible: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(GitbakError::config(format!(
                "backup_dir {} is not a directory",
                root.display()
            )));
        }

        for name in self.custom_apps.keys() {
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(GitbakError::config(format!("invalid application name '{}'", name)));
            }
        }

        IgnoreRules::new(&self.global_ignores)?;
        Ok(())
    }

    /// Add `raw_path` to `app`, creating the application when needed
    ///
    /// A leading `~` is expanded, any other relative path is taken relative to
    /// `cwd`. Returns `false` when the application already lists the same
    /// absolute path (in any spelling).
    pub fn add_path(&mut self, app: &str, raw_path: &str, cwd: &Path, resolver: &dyn PathResolver) -> Result<bool> {
        if app.trim().is_empty() {
            return Err(GitbakError::config("application name is empty"));
        }
        if raw_path.trim().is_empty() {
            return Err(GitbakError::config("path is empty"));
        }

        let absolute = if raw_path == "~" || raw_path.starts_with("~/") {
            resolver.expand(raw_path)?
        } else {
            cwd.join(raw_path)
        };

        let entry = self.custom_apps.entry(app.to_string()).or_default();
        for existing in &entry.paths {
            if resolver.expand(existing)? == absolute {
                info!("Path {} already exists in app {}. Nothing to do.", absolute.display(), app);
                return Ok(false);
            }
        }

        entry.paths.push(absolute.to_string_lossy().into_owned());
        info!("Added path {} to app {}.", absolute.display(), app);
        Ok(true)
    }

    /// Configuration of one application
    pub fn app(&self, name: &str) -> Result<&AppConfig> {
        self.custom_apps
            .get(name)
            .ok_or_else(|| GitbakError::UnknownApp(name.to_string()))
    }
}
