//! Backup orchestration
//!
//! [`Backup`] walks every configured application in name order. For each
//! one it runs the optional pre-backup hook, then copies each configured path
//! to `<backup-root>/<app>/<basename>` and records metadata for the copied
//! root and every entry below it. Once all applications are done, the
//! collected metadata replaces the manifest.
//!
//! ## Failure policy
//!
//! A failing hook fails its application (its paths are not copied); a
//! failing copy fails its application but the remaining paths still run.
//! Other applications are never affected. All failures are reported
//! together as [`GitbakError::BackupFailed`] after the last application,
//! and the manifest is left untouched in that case.
//!
//! ## Parallelism
//!
//! With [`BackupBuilder::parallel`] applications are mapped over a bounded
//! rayon pool. Results are joined in name order before the manifest is
//! written, so the manifest is identical to a sequential run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gitbak::{BackupBuilder, Config};
//! use std::path::Path;
//!
//! # fn main() -> gitbak::Result<()> {
//! let config = Config::load(Path::new("/home/u/.config/gitbak/gitbak.json"))?;
//! let report = BackupBuilder::new(config).dry_run(true).build().run()?;
//! println!("{} files", report.files_copied());
//! # Ok(())
//! # }
//! ```

use crate::config::{AppConfig, Config};
use crate::copier::TreeCopier;
use crate::error::{GitbakError, Result};
use crate::hooks::{self, HookRunner, ShellHookRunner};
use crate::metadata::{self, XattrProvider};
use crate::paths::{self, HomeResolver, PathResolver};
use crate::patterns::IgnoreRules;
use crate::types::{AppOutcome, AppState, BackupReport, CopyOptions, FileMetadata, TimestampPolicy};
use crate::utils;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A configured backup run
#[derive(Debug)]
pub struct Backup {
    config: Config,
    resolver: Arc<dyn PathResolver>,
    hooks: Arc<dyn HookRunner>,
    xattrs: Arc<dyn XattrProvider>,
    options: CopyOptions,
    parallel: bool,
    max_workers: usize,
}

/// Builder for [`Backup`]
#[derive(Debug)]
pub struct BackupBuilder {
    config: Config,
    resolver: Arc<dyn PathResolver>,
    hooks: Arc<dyn HookRunner>,
    xattrs: Arc<dyn XattrProvider>,
    options: CopyOptions,
    parallel: bool,
    max_workers: usize,
}

impl BackupBuilder {
    /// Start from a configuration, with the real home directory, `bash`
    /// hooks and the default xattr provider
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resolver: Arc::new(HomeResolver),
            hooks: Arc::new(ShellHookRunner::default()),
            xattrs: metadata::default_xattr_provider(),
            options: CopyOptions::default(),
            parallel: false,
            max_workers: num_cpus::get(),
        }
    }

    /// Resolve `~` and relative paths with `resolver`
    pub fn resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Run pre-backup hooks with `runner`
    pub fn hook_runner(mut self, runner: Arc<dyn HookRunner>) -> Self {
        self.hooks = runner;
        self
    }

    /// Read extended attributes with `provider`
    pub fn xattr_provider(mut self, provider: Arc<dyn XattrProvider>) -> Self {
        self.xattrs = provider;
        self
    }

    /// Log intended actions without touching the filesystem
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    /// How to treat modification times that cannot be preserved
    pub fn timestamps(mut self, policy: TimestampPolicy) -> Self {
        self.options.timestamps = policy;
        self
    }

    /// Process applications concurrently
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Upper bound on concurrent applications (minimum 1)
    pub fn max_workers(mut self, count: usize) -> Self {
        self.max_workers = count.max(1);
        self
    }

    /// Finish building
    pub fn build(self) -> Backup {
        Backup {
            config: self.config,
            resolver: self.resolver,
            hooks: self.hooks,
            xattrs: self.xattrs,
            options: self.options,
            parallel: self.parallel,
            max_workers: self.max_workers,
        }
    }
}

impl Backup {
    /// Run the backup
    ///
    /// # Errors
    ///
    /// - [`GitbakError::InvalidPattern`] if an ignore rule does not compile;
    ///   nothing is copied in that case
    /// - [`GitbakError::InvalidConfiguration`] if the backup root cannot be
    ///   resolved
    /// - [`GitbakError::BackupFailed`] with every application error
    /// - [`GitbakError::Io`] / [`GitbakError::Json`] if the manifest cannot
    ///   be written
    pub fn run(&self) -> Result<BackupReport> {
        let start = Instant::now();
        let rules = IgnoreRules::new(&self.config.global_ignores)?;
        let root = self.config.backup_root(self.resolver.as_ref())?;
        let apps: Vec<(&String, &AppConfig)> = self.config.custom_apps.iter().collect();

        info!(
            "Backing up {} app(s) to {}{}",
            apps.len(),
            root.display(),
            if self.options.dry_run { " [dry-run]" } else { "" }
        );

        let outcomes: Vec<AppOutcome> = if self.parallel && apps.len() > 1 {
            let workers = self.max_workers.min(apps.len());
            debug!("Using {} worker threads", workers);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| GitbakError::internal(format!("cannot start worker pool: {}", e)))?;
            pool.install(|| {
                apps.par_iter()
                    .map(|(name, app)| self.backup_app(name, app, &root, &rules))
                    .collect()
            })
        } else {
            apps.iter()
                .map(|(name, app)| self.backup_app(name, app, &root, &rules))
                .collect()
        };

        let errors: Vec<String> = outcomes.iter().flat_map(|o| o.errors.iter().cloned()).collect();
        if !errors.is_empty() {
            for error in &errors {
                warn!("{}", error);
            }
            return Err(GitbakError::BackupFailed(errors));
        }

        let entries: Vec<FileMetadata> = outcomes.iter().flat_map(|o| o.metadata.iter().cloned()).collect();
        let manifest_written = if self.options.dry_run {
            info!("[dry-run] Would write {} metadata records", entries.len());
            false
        } else if entries.is_empty() {
            debug!("No metadata collected; manifest left as is");
            false
        } else {
            metadata::save_manifest(&root, &entries)?;
            info!("Metadata saved to {}", metadata::manifest_path(&root).display());
            true
        };

        Ok(BackupReport {
            apps: outcomes,
            entries: entries.len(),
            manifest_written,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Back up one application, never failing the whole run
    fn backup_app(&self, name: &str, app: &AppConfig, root: &Path, rules: &IgnoreRules) -> AppOutcome {
        let mut outcome = AppOutcome::new(name);
        info!("Processing custom app: {}", name);

        if let Some(command) = app.hook() {
            outcome.state = AppState::HookRunning;
            let result = self
                .resolver
                .expand_tilde(command)
                .and_then(|cmd| hooks::run_pre_backup_hook(self.hooks.as_ref(), name, &cmd, self.options.dry_run));
            if let Err(e) = result {
                outcome.fail(e.to_string());
                return outcome;
            }
        }

        outcome.state = AppState::CopyingPaths;
        let copier = TreeCopier::new(self.options);
        for raw in &app.paths {
            match self.backup_path(name, raw, root, rules, &copier, &mut outcome) {
                Ok(true) => outcome.paths_copied += 1,
                Ok(false) => outcome.paths_skipped += 1,
                Err(e) => outcome.fail(format!("{}: copying {}: {}", name, raw, e)),
            }
        }

        if outcome.state != AppState::Failed {
            outcome.state = AppState::Done;
        }
        info!(
            "{}: {} path(s) copied, {} skipped, {} file(s), {}",
            name,
            outcome.paths_copied,
            outcome.paths_skipped,
            outcome.files_copied,
            utils::format_bytes(outcome.bytes_copied)
        );
        outcome
    }

    /// Copy one configured path; `Ok(false)` when it was skipped
    fn backup_path(
        &self,
        app: &str,
        raw: &str,
        root: &Path,
        rules: &IgnoreRules,
        copier: &TreeCopier,
        outcome: &mut AppOutcome,
    ) -> Result<bool> {
        let source = self.resolver.expand(raw)?;
        let source_meta = match fs::metadata(&source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{}: Skipped {} (does not exist)", app, source.display());
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let is_dir = source_meta.is_dir();

        let decision = rules.matches(&source, is_dir);
        if decision.ignored {
            info!(
                "{}: Ignored {} (matched global ignore pattern \"{}\")",
                app,
                source.display(),
                decision.rule.unwrap_or_default()
            );
            return Ok(false);
        }

        let destination = paths::backup_location(root, app, &source)?;
        let key = paths::manifest_key(app, &source)?;
        let base = source.parent().unwrap_or(&source);

        match metadata::collect_metadata(&source, base, self.xattrs.as_ref()) {
            Ok(mut meta) => {
                meta.path = key.clone();
                outcome.metadata.push(meta);
            }
            Err(e) => warn!("{}: Failed to collect metadata for {}: {}", app, source.display(), e),
        }

        if is_dir {
            let report = copier.copy_dir(&source, &destination, rules)?;
            for entry in &report.entries {
                match metadata::collect_metadata(&entry.source, &source, self.xattrs.as_ref()) {
                    Ok(mut meta) => {
                        meta.path = format!("{}/{}", key, meta.path);
                        outcome.metadata.push(meta);
                    }
                    Err(e) => warn!("{}: Failed to collect metadata for {}: {}", app, entry.source.display(), e),
                }
            }
            outcome.files_copied += report.files_copied;
            outcome.bytes_copied += report.bytes_copied;
        } else {
            outcome.bytes_copied += copier.copy_file_as(&source, &destination)?;
            outcome.files_copied += 1;
        }

        debug!("{}: {} → {}", app, source.display(), destination.display());
        Ok(true)
    }
}
