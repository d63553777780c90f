//! Restore orchestration
//!
//! [`Restore`] is the inverse of [`crate::backup::Backup`]: for every
//! configured path it finds the backed-up copy under
//! `<backup-root>/<app>/<basename>`, copies it back to the original location
//! and re-applies the metadata recorded in the manifest.
//!
//! ## Conflicts
//!
//! When the original location already exists, a [`ConflictResolver`] decides
//! what happens:
//!
//! - **skip**: the destination is left exactly as it is
//! - **overwrite**: the backup is copied on top of it
//! - **backup**: the destination is renamed to
//!   `<path>.gitbak-restore-state-<YYYY-MM-DDTHH:MM:SS>` first
//!
//! The binary prompts on stdin ([`StdinResolver`]); tests and batch use
//! replay answers ([`ScriptedResolver`], [`FixedResolver`]).
//!
//! ## Failures
//!
//! Restore never stops at a bad path. Missing backups, copy errors and
//! metadata problems are reported per path in the [`RestoreReport`].

use crate::config::{AppConfig, Config};
use crate::copier::TreeCopier;
use crate::error::{GitbakError, Result};
use crate::metadata::{self, ManifestIndex, XattrProvider};
use crate::paths::{self, HomeResolver, PathResolver};
use crate::types::{
    AppRestore, CopyOptions, FileMetadata, PathOutcome, Resolution, RestoreReport, TimestampPolicy,
    RESTORE_STATE_INFIX,
};
use crate::utils;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Decides what to do with a restore destination that already exists
pub trait ConflictResolver: Send + fmt::Debug {
    /// Choose a resolution for `path`
    fn resolve(&mut self, path: &Path) -> Resolution;
}

/// Prompt the operator and parse one answer line
///
/// End of input or a read error counts as skip.
pub fn prompt_resolution<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, path: &Path) -> Resolution {
    let prompt = write!(
        writer,
        "  [conflict] {} already exists. (s)kip, (o)verwrite, (b)ackup? ",
        path.display()
    )
    .and_then(|_| writer.flush());
    if let Err(e) = prompt {
        warn!("Cannot prompt for {:?}: {}", path, e);
        return Resolution::Skip;
    }

    let mut answer = String::new();
    match reader.read_line(&mut answer) {
        Ok(0) | Err(_) => Resolution::Skip,
        Ok(_) => Resolution::parse(&answer),
    }
}

/// Asks on the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinResolver;

impl ConflictResolver for StdinResolver {
    fn resolve(&mut self, path: &Path) -> Resolution {
        let stdin = io::stdin();
        let stdout = io::stdout();
        prompt_resolution(&mut stdin.lock(), &mut stdout.lock(), path)
    }
}

/// Replays a fixed list of answers, then skips
#[derive(Debug, Clone, Default)]
pub struct ScriptedResolver {
    answers: VecDeque<Resolution>,
    asked: Vec<PathBuf>,
}

impl ScriptedResolver {
    /// Answers in operator syntax (`s`, `o`, `b`)
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            answers: answers.into_iter().map(|a| Resolution::parse(a.as_ref())).collect(),
            asked: Vec::new(),
        }
    }

    /// Paths asked about so far
    pub fn asked(&self) -> &[PathBuf] {
        &self.asked
    }
}

impl ConflictResolver for ScriptedResolver {
    fn resolve(&mut self, path: &Path) -> Resolution {
        self.asked.push(path.to_path_buf());
        self.answers.pop_front().unwrap_or(Resolution::Skip)
    }
}

/// Always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver(pub Resolution);

impl ConflictResolver for FixedResolver {
    fn resolve(&mut self, _path: &Path) -> Resolution {
        self.0
    }
}

/// Name an existing destination is moved to
///
/// If that name is taken (two restores within one second) a counter is
/// appended.
pub fn aside_path(destination: &Path, now: DateTime<Local>) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(RESTORE_STATE_INFIX);
    name.push(now.format("%Y-%m-%dT%H:%M:%S").to_string());

    let candidate = PathBuf::from(&name);
    if fs::symlink_metadata(&candidate).is_err() {
        return candidate;
    }
    let mut n = 1;
    loop {
        let mut numbered = name.clone();
        numbered.push(format!("-{}", n));
        let numbered = PathBuf::from(numbered);
        if fs::symlink_metadata(&numbered).is_err() {
            return numbered;
        }
        n += 1;
    }
}

/// Find the backed-up copy of `original`
///
/// Tries the rooting rule on the expanded path first, then on the path as
/// written in the configuration.
///
/// # Errors
///
/// - [`GitbakError::BackupNotFound`] naming the last location tried
pub fn locate_backup(backup_root: &Path, app: &str, raw: &str, original: &Path) -> Result<PathBuf> {
    let primary = paths::backup_location(backup_root, app, original)?;
    if fs::symlink_metadata(&primary).is_ok() {
        return Ok(primary);
    }

    let mut tried = primary;
    if let Ok(fallback) = paths::backup_location(backup_root, app, Path::new(raw)) {
        if fallback != tried {
            debug!("{} not found, trying {:?}", tried.display(), fallback);
            if fs::symlink_metadata(&fallback).is_ok() {
                return Ok(fallback);
            }
            tried = fallback;
        }
    }

    Err(GitbakError::BackupNotFound {
        name: utils::base_name(original)?,
        tried,
    })
}

/// A configured restore run
#[derive(Debug)]
pub struct Restore {
    config: Config,
    resolver: Arc<dyn PathResolver>,
    conflicts: Mutex<Box<dyn ConflictResolver>>,
    xattrs: Arc<dyn XattrProvider>,
    dry_run: bool,
    only_app: Option<String>,
    timestamps: TimestampPolicy,
}

/// Builder for [`Restore`]
#[derive(Debug)]
pub struct RestoreBuilder {
    config: Config,
    resolver: Arc<dyn PathResolver>,
    conflicts: Box<dyn ConflictResolver>,
    xattrs: Arc<dyn XattrProvider>,
    dry_run: bool,
    only_app: Option<String>,
    timestamps: TimestampPolicy,
}

impl RestoreBuilder {
    /// Start from a configuration, prompting on stdin for conflicts
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resolver: Arc::new(HomeResolver),
            conflicts: Box::new(StdinResolver),
            xattrs: metadata::default_xattr_provider(),
            dry_run: false,
            only_app: None,
            timestamps: TimestampPolicy::default(),
        }
    }

    /// Resolve `~` and relative paths with `resolver`
    pub fn resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Decide conflicts with `resolver`
    pub fn conflict_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.conflicts = resolver;
        self
    }

    /// Apply extended attributes with `provider`
    pub fn xattr_provider(mut self, provider: Arc<dyn XattrProvider>) -> Self {
        self.xattrs = provider;
        self
    }

    /// Log intended actions without prompting or writing
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Restore a single application
    pub fn only_app(mut self, app: Option<String>) -> Self {
        self.only_app = app.filter(|a| !a.is_empty());
        self
    }

    /// How to treat modification times that cannot be preserved
    pub fn timestamps(mut self, policy: TimestampPolicy) -> Self {
        self.timestamps = policy;
        self
    }

    /// Finish building
    pub fn build(self) -> Restore {
        Restore {
            config: self.config,
            resolver: self.resolver,
            conflicts: Mutex::new(self.conflicts),
            xattrs: self.xattrs,
            dry_run: self.dry_run,
            only_app: self.only_app,
            timestamps: self.timestamps,
        }
    }
}

impl Restore {
    /// Run the restore
    ///
    /// # Errors
    ///
    /// - [`GitbakError::UnknownApp`] if a single application was requested
    ///   and is not configured
    /// - [`GitbakError::InvalidConfiguration`] if the backup root cannot be
    ///   resolved
    ///
    /// Everything else is reported per path in the returned report.
    pub fn run(&self) -> Result<RestoreReport> {
        let start = Instant::now();
        let root = self.config.backup_root(self.resolver.as_ref())?;

        let apps: Vec<(&str, &AppConfig)> = match &self.only_app {
            Some(name) => vec![(name.as_str(), self.config.app(name)?)],
            None => self
                .config
                .custom_apps
                .iter()
                .map(|(name, app)| (name.as_str(), app))
                .collect(),
        };

        let mut report = RestoreReport::default();
        let index = match metadata::load_manifest(&root) {
            Ok(entries) => ManifestIndex::new(entries),
            Err(e) => {
                let warning = format!("Failed to load metadata: {}", e);
                warn!("{}", warning);
                report.warnings.push(warning);
                ManifestIndex::default()
            }
        };

        for (name, app) in apps {
            info!("● Restoring app: {}", name);
            let mut restored = AppRestore {
                app: name.to_string(),
                paths: Vec::with_capacity(app.paths.len()),
            };
            for raw in &app.paths {
                let outcome = self.restore_path(name, raw, &root, &index, &mut report.warnings);
                restored.paths.push(outcome);
            }
            report.apps.push(restored);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    fn restore_path(
        &self,
        app: &str,
        raw: &str,
        root: &Path,
        index: &ManifestIndex,
        warnings: &mut Vec<String>,
    ) -> PathOutcome {
        let original = match self.resolver.expand(raw) {
            Ok(path) => path,
            Err(e) => return failed(PathBuf::from(raw), e),
        };

        let from = match locate_backup(root, app, raw, &original) {
            Ok(from) => from,
            Err(GitbakError::BackupNotFound { name, tried }) => {
                warn!("  [error] restoring {}: backup not found: {} (tried {})", raw, name, tried.display());
                return PathOutcome::NotFound { path: original, tried };
            }
            Err(e) => return failed(original, e),
        };
        let is_dir = from.is_dir();

        if self.dry_run {
            let kind = if is_dir { "directory" } else { "file" };
            info!("[dry-run] Would restore {} {} → {}", kind, from.display(), original.display());
            return PathOutcome::DryRun { from, to: original };
        }

        let mut aside = None;
        if fs::symlink_metadata(&original).is_ok() {
            match self.conflicts.lock().resolve(&original) {
                Resolution::Skip => {
                    info!("  [skipped] {}", original.display());
                    return PathOutcome::Skipped { path: original };
                }
                Resolution::Overwrite => debug!("Overwriting {}", original.display()),
                Resolution::BackupAside => {
                    let moved = aside_path(&original, Local::now());
                    if let Err(e) = fs::rename(&original, &moved) {
                        return failed(original, GitbakError::from(e));
                    }
                    info!("  [backup] created backup at {}", moved.display());
                    aside = Some(moved);
                }
            }
        }

        let copier = TreeCopier::new(CopyOptions {
            dry_run: false,
            timestamps: self.timestamps,
        });
        let copied = if is_dir {
            copier.restore_dir(&from, &original).map(|_| ())
        } else {
            copier.restore_file(&from, &original).map(|_| ())
        };
        if let Err(e) = copied {
            return failed(original, e);
        }

        self.apply_recorded_metadata(app, &original, index, warnings);
        PathOutcome::Restored {
            from,
            to: original,
            aside,
        }
    }

    /// Apply manifest records of `original` and everything below it
    ///
    /// Records are stored as `<app>/<basename>/...`; dropping the `<app>/`
    /// prefix makes them relative to the parent of the original location.
    fn apply_recorded_metadata(&self, app: &str, original: &Path, index: &ManifestIndex, warnings: &mut Vec<String>) {
        let (key, parent) = match (paths::manifest_key(app, original), original.parent()) {
            (Ok(key), Some(parent)) => (key, parent),
            _ => return,
        };

        let records: Vec<&FileMetadata> = index.subtree(&key).collect();
        if records.is_empty() {
            if !index.is_empty() {
                let warning = format!("No metadata recorded for {}", key);
                warn!("  [warning] {}", warning);
                warnings.push(warning);
            }
            return;
        }

        let prefix_len = app.len() + 1;
        // Children first so a restrictive directory mode cannot lock them out
        for record in records.into_iter().rev() {
            let mut rebased = record.clone();
            rebased.path = record.path[prefix_len..].to_string();

            match metadata::apply_metadata(parent, &rebased, false, self.xattrs.as_ref()) {
                Ok(outcome) => warnings.extend(outcome.warnings),
                Err(e) => {
                    let warning = format!("Failed to apply metadata to {}: {}", parent.join(&rebased.path).display(), e);
                    warn!("  [warning] {}", warning);
                    warnings.push(warning);
                }
            }
        }
    }
}

fn failed(path: PathBuf, e: GitbakError) -> PathOutcome {
    error!("  [error] restoring {}: {}", path.display(), e);
    PathOutcome::Failed {
        path,
        error: e.to_string(),
    }
}
