//! End-to-end tests for gitbak
//!
//! Every test works inside a fake home directory so `~` never escapes the
//! temporary tree.

use ::gitbak::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Test harness owning a fake home with a backup root inside it
pub struct GitbakTestHarness {
    pub home: TempDir,
    pub config: Config,
}

impl GitbakTestHarness {
    /// Create an empty home with `~/backup` as the backup root
    pub fn new() -> Self {
        let home = TempDir::new().unwrap();
        fs::create_dir(home.path().join("backup")).unwrap();
        let config = Config {
            backup_dir: "~/backup".to_string(),
            ..Default::default()
        };
        Self { home, config }
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    pub fn backup_root(&self) -> PathBuf {
        self.home().join("backup")
    }

    /// Write a file below the home directory
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.home().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Register `paths` under `app`
    pub fn track(&mut self, app: &str, paths: &[&str]) {
        self.config.custom_apps.insert(
            app.to_string(),
            AppConfig {
                paths: paths.iter().map(|p| p.to_string()).collect(),
                pre_backup_script: None,
            },
        );
    }

    fn resolver(&self) -> Arc<dyn PathResolver> {
        Arc::new(FixedHome::new(self.home()))
    }

    pub fn backup(&self) -> BackupBuilder {
        BackupBuilder::new(self.config.clone())
            .resolver(self.resolver())
            .xattr_provider(Arc::new(NoXattrs))
    }

    pub fn restore(&self, answers: &[&str]) -> RestoreBuilder {
        RestoreBuilder::new(self.config.clone())
            .resolver(self.resolver())
            .xattr_provider(Arc::new(NoXattrs))
            .conflict_resolver(Box::new(ScriptedResolver::new(answers.iter().copied())))
    }

    /// Relative path and content of every file below `dir`, sorted
    pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned();
                files.push((relative, fs::read(entry.path()).unwrap()));
            }
        }
        files
    }
}

#[cfg(unix)]
fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(unix)]
#[test]
fn test_round_trip_preserves_mixed_modes() {
    let mut h = GitbakTestHarness::new();
    let plain = h.write(".config/tool/config.toml", "answer = 42");
    let script = h.write(".config/tool/bin/run.sh", "#!/bin/sh\necho hi");
    set_mode(&plain, 0o644);
    set_mode(&script, 0o755);
    h.track("tool", &["~/.config/tool"]);

    h.backup().build().run().unwrap();
    assert_eq!(mode_of(&h.backup_root().join("tool/tool/bin/run.sh")), 0o755);

    fs::remove_dir_all(h.home().join(".config/tool")).unwrap();
    let report = h.restore(&[]).build().run().unwrap();
    info!("restore report: {:?}", report);

    assert_eq!(report.restored(), 1);
    assert_eq!(fs::read_to_string(&plain).unwrap(), "answer = 42");
    assert_eq!(mode_of(&plain), 0o644);
    assert_eq!(mode_of(&script), 0o755);
}

#[test]
fn test_backup_is_idempotent() {
    let mut h = GitbakTestHarness::new();
    h.write(".config/app/a.txt", "a");
    h.write(".config/app/nested/b.txt", "b");
    h.write(".profile", "export X=1");
    h.track("app", &["~/.config/app"]);
    h.track("shell", &["~/.profile"]);

    h.backup().build().run().unwrap();
    let first_tree = GitbakTestHarness::snapshot(&h.backup_root().join("app"));
    let first_manifest = metadata::load_manifest(&h.backup_root()).unwrap();

    h.backup().build().run().unwrap();
    let second_tree = GitbakTestHarness::snapshot(&h.backup_root().join("app"));
    let second_manifest = metadata::load_manifest(&h.backup_root()).unwrap();

    assert_eq!(first_tree, second_tree);
    assert_eq!(first_manifest.len(), second_manifest.len());
    for (a, b) in first_manifest.iter().zip(&second_manifest) {
        assert!(a.same_attributes(b), "{:?} vs {:?}", a, b);
    }
}

#[test]
fn test_dry_run_backup_and_restore_are_pure() {
    let mut h = GitbakTestHarness::new();
    h.write(".vimrc", "set nu");
    h.write(".config/x/y.conf", "y");
    h.track("vim", &["~/.vimrc", "~/.config/x"]);

    let report = h.backup().dry_run(true).build().run().unwrap();
    assert!(!report.manifest_written);
    assert_eq!(fs::read_dir(h.backup_root()).unwrap().count(), 0);

    // Real backup, then a dry-run restore onto changed files
    h.backup().build().run().unwrap();
    fs::write(h.home().join(".vimrc"), "changed").unwrap();
    let before = GitbakTestHarness::snapshot(h.home());

    let restore = h.restore(&["o", "o"]).dry_run(true).build().run().unwrap();
    assert!(restore.outcomes().all(|o| matches!(o, PathOutcome::DryRun { .. })));
    assert_eq!(before, GitbakTestHarness::snapshot(h.home()));
}

#[test]
fn test_conflict_backup_aside_and_skip() {
    let mut h = GitbakTestHarness::new();
    h.write(".gitconfig", "original git");
    h.write(".tmux.conf", "original tmux");
    h.track("dev", &["~/.gitconfig", "~/.tmux.conf"]);
    h.backup().build().run().unwrap();

    fs::write(h.home().join(".gitconfig"), "local git").unwrap();
    fs::write(h.home().join(".tmux.conf"), "local tmux").unwrap();

    let report = h.restore(&["b", "s"]).build().run().unwrap();

    // b: old content moved aside, backup content restored
    let aside = match &report.apps[0].paths[0] {
        PathOutcome::Restored { aside: Some(aside), .. } => aside.clone(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(fs::read_to_string(aside).unwrap(), "local git");
    assert_eq!(fs::read_to_string(h.home().join(".gitconfig")).unwrap(), "original git");

    // s: untouched byte for byte
    assert!(matches!(report.apps[0].paths[1], PathOutcome::Skipped { .. }));
    assert_eq!(fs::read_to_string(h.home().join(".tmux.conf")).unwrap(), "local tmux");
}

#[test]
fn test_overwrite_directory_keeps_extra_local_files() {
    let mut h = GitbakTestHarness::new();
    h.write(".config/nvim/init.lua", "v1");
    h.track("nvim", &["~/.config/nvim"]);
    h.backup().build().run().unwrap();

    h.write(".config/nvim/init.lua", "v2");
    h.write(".config/nvim/local-only.lua", "mine");

    h.restore(&["o"]).build().run().unwrap();
    assert_eq!(fs::read_to_string(h.home().join(".config/nvim/init.lua")).unwrap(), "v1");
    assert!(h.home().join(".config/nvim/local-only.lua").exists());
}

#[test]
fn test_directory_exclusion_short_circuits_descent() {
    let mut h = GitbakTestHarness::new();
    h.write("project/src/main.rs", "fn main() {}");
    h.write("project/node_modules/pkg/index.js", "x");
    h.write("project/node_modules/pkg/keep.md", "k");
    h.config.global_ignores = vec!["node_modules/".to_string(), "!keep.md".to_string()];
    h.track("code", &["~/project"]);

    let report = h.backup().build().run().unwrap();

    let copied = h.backup_root().join("code/project");
    assert!(copied.join("src/main.rs").exists());
    assert!(!copied.join("node_modules").exists());
    assert_eq!(report.apps[0].files_copied, 1);
}

#[test]
fn test_manifest_round_trip_through_copy() {
    let mut h = GitbakTestHarness::new();
    h.write(".config/app/settings.json", "{}");
    h.track("app", &["~/.config/app"]);
    h.backup().build().run().unwrap();

    let manifest = metadata::load_manifest(&h.backup_root()).unwrap();
    let raw = fs::read_to_string(metadata::manifest_path(&h.backup_root())).unwrap();
    let reparsed: Vec<FileMetadata> = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest, reparsed);

    // Apply every record to a copy of the backup and compare what comes back
    let copy = TempDir::new().unwrap();
    TreeCopier::default()
        .restore_dir(&h.backup_root(), copy.path())
        .unwrap();
    for record in &manifest {
        apply_metadata(copy.path(), record, false, &NoXattrs).unwrap();
        let again = collect_metadata(&copy.path().join(&record.path), copy.path(), &NoXattrs).unwrap();
        assert!(record.same_attributes(&again), "{:?} vs {:?}", record, again);
        assert_eq!(record.modified_time().unwrap(), again.modified_time().unwrap());
    }
}

#[cfg(unix)]
#[test]
fn test_hook_failure_isolated_to_its_app() {
    let mut h = GitbakTestHarness::new();
    h.write(".bashrc", "alias ll='ls -l'");
    h.track("bash", &["~/.bashrc"]);
    h.track("brew", &["~/Brewfile"]);
    h.config.custom_apps.get_mut("brew").unwrap().pre_backup_script = Some("exit 7".to_string());

    let dump = h.home().join("dump.txt");
    h.config.custom_apps.get_mut("bash").unwrap().pre_backup_script =
        Some(format!("echo dumped > '{}'", dump.display()));

    let err = h.backup().build().run().unwrap_err();
    match err {
        GitbakError::BackupFailed(errors) => {
            assert_eq!(errors, vec!["brew: pre-backup script failed: exit status 7".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fs::read_to_string(dump).unwrap().trim(), "dumped");
    assert!(h.backup_root().join("bash/.bashrc").exists());
    assert!(!metadata::manifest_path(&h.backup_root()).exists());
}

#[test]
fn test_parallel_backup_matches_sequential() {
    let mut h = GitbakTestHarness::new();
    for i in 0..6 {
        h.write(&format!(".config/app{}/conf", i), &format!("value {}", i));
        h.track(&format!("app{}", i), &[&format!("~/.config/app{}", i)]);
    }

    let sequential = h.backup().build().run().unwrap();
    let seq_manifest = metadata::load_manifest(&h.backup_root()).unwrap();

    let parallel = h.backup().parallel(true).max_workers(3).build().run().unwrap();
    let par_manifest = metadata::load_manifest(&h.backup_root()).unwrap();

    let names = |r: &BackupReport| r.apps.iter().map(|a| a.app.clone()).collect::<Vec<_>>();
    assert_eq!(names(&sequential), names(&parallel));
    let paths = |m: &[FileMetadata]| m.iter().map(|e| e.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&seq_manifest), paths(&par_manifest));
}

#[test]
fn test_missing_source_is_skipped_not_failed() {
    let mut h = GitbakTestHarness::new();
    h.write(".zshrc", "z");
    h.track("zsh", &["~/.zshrc", "~/.zsh_history_that_is_gone"]);

    let report = h.backup().build().run().unwrap();
    assert_eq!(report.apps[0].state, AppState::Done);
    assert_eq!(report.apps[0].paths_copied, 1);
    assert_eq!(report.apps[0].paths_skipped, 1);
}
