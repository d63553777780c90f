//! # gitbak CLI - dotfile backups you can commit
//!
//! Command-line front end for the gitbak library.
//!
//! ## Usage
//! ```bash
//! # Track a file or directory under an application name
//! gitbak add --app nvim --path ~/.config/nvim
//!
//! # Mirror everything into the backup root, then commit and push it
//! gitbak backup
//!
//! # See what a backup would do without touching anything
//! gitbak backup --dry-run --no-commit
//!
//! # Put one application back, overwriting what is there
//! gitbak restore --app nvim --yes-overwrite
//! ```

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::*;
use gitbak::config::DEFAULT_CONFIG_PATH;
use gitbak::{
    format_bytes, BackupBuilder, BackupReport, Committer, Config, ConflictResolver, FixedResolver, GitCommitter,
    GitbakError, HomeResolver, PathOutcome, PathResolver, Resolution, RestoreBuilder, RestoreReport,
    StdinResolver, TimestampPolicy,
};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// gitbak - back up configuration files into a git repository
#[derive(Parser)]
#[command(name = "gitbak")]
#[command(author = "Kenny Parsons")]
#[command(version)]
#[command(about = "Back up and restore dotfiles through a git repository")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a path to an application
    Add {
        /// Application name (created if missing)
        #[arg(long)]
        app: String,

        /// File or directory to track
        #[arg(long)]
        path: String,
    },

    /// Copy every configured path into the backup root
    Backup {
        /// Print steps without executing
        #[arg(long)]
        dry_run: bool,

        /// Skip git add/commit/push after backup
        #[arg(long)]
        no_commit: bool,

        /// Back up applications concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum concurrent applications (defaults to CPU count)
        #[arg(long, requires = "parallel")]
        workers: Option<usize>,

        /// Fail when a modification time cannot be preserved
        #[arg(long)]
        strict_timestamps: bool,

        /// Show a spinner while copying
        #[arg(long)]
        progress: bool,
    },

    /// Restore backed-up paths to their original locations
    Restore {
        /// Print steps without executing
        #[arg(long)]
        dry_run: bool,

        /// Only restore this application
        #[arg(long)]
        app: Option<String>,

        /// Overwrite existing files without asking
        #[arg(long)]
        yes_overwrite: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let config_path = cli.config.clone();
    if let Err(e) = run(cli) {
        let gitbak_error = e.downcast_ref::<GitbakError>();
        let message = match gitbak_error {
            Some(err) if e.chain().count() == 1 => err.user_message(),
            _ => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        if gitbak_error.is_some_and(|err| err.is_configuration()) {
            eprintln!("{} check the configuration file at {}", "hint:".yellow(), config_path);
        }
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let resolver = HomeResolver;
    let config_path = resolver.expand(&cli.config)?;

    match cli.command {
        Commands::Add { app, path } => cmd_add(config_path, &app, &path),
        Commands::Backup {
            dry_run,
            no_commit,
            parallel,
            workers,
            strict_timestamps,
            progress,
        } => cmd_backup(
            config_path,
            dry_run,
            no_commit,
            parallel,
            workers,
            strict_timestamps,
            progress,
        ),
        Commands::Restore {
            dry_run,
            app,
            yes_overwrite,
        } => cmd_restore(config_path, dry_run, app, yes_overwrite),
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("loading config from {}", path.display()))
}

/// Add a path to an application and save the configuration
fn cmd_add(config_path: PathBuf, app: &str, path: &str) -> anyhow::Result<()> {
    let mut config = load_config(&config_path)?;
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;

    if config.add_path(app, path, &cwd, &HomeResolver)? {
        config.save(&config_path)?;
        println!(
            "{} Successfully updated config at {}",
            "✓".green().bold(),
            config_path.display().to_string().cyan()
        );
    } else {
        println!("{} Nothing to do", "•".yellow());
    }
    Ok(())
}

/// Run a backup, then commit and push the backup root
fn cmd_backup(
    config_path: PathBuf,
    dry_run: bool,
    no_commit: bool,
    parallel: bool,
    workers: Option<usize>,
    strict_timestamps: bool,
    show_progress: bool,
) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    config.validate(&HomeResolver)?;
    let root = config.backup_root(&HomeResolver)?;

    if dry_run {
        println!("{}", "Backing up (dry run)...".blue().bold());
    } else {
        println!("{}", "Backing up...".blue().bold());
    }

    let mut builder = BackupBuilder::new(config)
        .dry_run(dry_run)
        .parallel(parallel)
        .timestamps(if strict_timestamps {
            TimestampPolicy::FailHard
        } else {
            TimestampPolicy::BestEffort
        });
    if let Some(count) = workers {
        builder = builder.max_workers(count);
    }

    let progress = show_progress.then(|| spinner("Copying files..."));
    let result = builder.build().run();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let report = result?;
    print_backup_summary(&report);

    if no_commit {
        return Ok(());
    }
    GitCommitter::default().commit_and_push(&root, dry_run)?;
    if !dry_run {
        println!("{} Committed and pushed {}", "✓".green().bold(), root.display().to_string().cyan());
    }
    Ok(())
}

/// Restore configured paths
fn cmd_restore(config_path: PathBuf, dry_run: bool, app: Option<String>, yes_overwrite: bool) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    let conflicts: Box<dyn ConflictResolver> = if yes_overwrite {
        Box::new(FixedResolver(Resolution::Overwrite))
    } else {
        Box::new(StdinResolver)
    };

    let report = RestoreBuilder::new(config)
        .resolver(Arc::new(HomeResolver))
        .conflict_resolver(conflicts)
        .dry_run(dry_run)
        .only_app(app)
        .build()
        .run()?;

    print_restore_summary(&report);

    let failed = report
        .outcomes()
        .filter(|o| matches!(o, PathOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        return Err(anyhow!("{} path(s) could not be restored", failed));
    }
    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_backup_summary(report: &BackupReport) {
    println!("{} Backup complete", "✓".green().bold());
    for app in &report.apps {
        println!(
            "  {}: {} path(s), {} file(s), {}",
            app.app.cyan(),
            app.paths_copied,
            app.files_copied,
            format_bytes(app.bytes_copied)
        );
    }
    println!("  Metadata records: {}", report.entries.to_string().cyan());
    if !report.manifest_written {
        println!("  {}", "Manifest not written".dimmed());
    }
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
}

fn print_restore_summary(report: &RestoreReport) {
    for app in &report.apps {
        println!("{} {}", "●".blue(), app.app.bold());
        for outcome in &app.paths {
            match outcome {
                PathOutcome::Restored { to, aside, .. } => {
                    println!("  {} {}", "restored".green(), to.display());
                    if let Some(aside) = aside {
                        println!("    {} {}", "previous version at".dimmed(), aside.display());
                    }
                }
                PathOutcome::Skipped { path } => println!("  {} {}", "skipped".yellow(), path.display()),
                PathOutcome::NotFound { path, tried } => println!(
                    "  {} {} (tried {})",
                    "not found".red(),
                    path.display(),
                    tried.display()
                ),
                PathOutcome::DryRun { from, to } => {
                    println!("  {} {} → {}", "would restore".blue(), from.display(), to.display())
                }
                PathOutcome::Failed { path, error } => {
                    println!("  {} {}: {}", "failed".red().bold(), path.display(), error)
                }
            }
        }
    }
    for warning in &report.warnings {
        println!("{} {}", "warning:".yellow(), warning);
    }
    println!(
        "\n{}",
        format!(
            "{} restored, {} problem(s) in {}",
            report.restored(),
            report.failures(),
            format_duration(Duration::from_millis(report.duration_ms))
        )
        .dimmed()
    );
}
