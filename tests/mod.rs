//! Main test module for gitbak
//!
//! This module includes all test suites:
//! - Integration tests for backup and restore scenarios
//! - Property-based tests for the ignore matcher
//! - Edge cases around unusual file names and layouts

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::gitbak::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn single_app_config(app: &str, paths: &[&str]) -> Config {
        let mut config = Config {
            backup_dir: "~/backup".to_string(),
            ..Default::default()
        };
        config.custom_apps.insert(
            app.to_string(),
            AppConfig {
                paths: paths.iter().map(|p| p.to_string()).collect(),
                pre_backup_script: None,
            },
        );
        config
    }

    fn backup(home: &Path, config: &Config) -> BackupReport {
        BackupBuilder::new(config.clone())
            .resolver(Arc::new(FixedHome::new(home)))
            .xattr_provider(Arc::new(NoXattrs))
            .build()
            .run()
            .unwrap()
    }

    #[test]
    fn test_empty_directory() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("backup")).unwrap();
        fs::create_dir_all(home.path().join(".config/empty")).unwrap();

        let report = backup(home.path(), &single_app_config("empty", &["~/.config/empty"]));

        assert!(home.path().join("backup/empty/empty").is_dir());
        assert_eq!(report.files_copied(), 0);
        assert_eq!(report.entries, 1);
    }

    #[test]
    fn test_special_filenames() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("backup")).unwrap();
        let dir = home.path().join("notes");
        fs::create_dir_all(&dir).unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
            "file{with}braces.txt",
            "файл.txt",
            "文件.txt",
        ];
        let mut written = Vec::new();
        for name in &special_names {
            if fs::write(dir.join(name), format!("Content of {}", name)).is_ok() {
                written.push(*name);
            }
        }

        backup(home.path(), &single_app_config("notes", &["~/notes"]));

        for name in written {
            let copied = home.path().join("backup/notes/notes").join(name);
            assert_eq!(fs::read_to_string(copied).unwrap(), format!("Content of {}", name));
        }
    }

    #[test]
    fn test_brackets_in_path_do_not_confuse_rules() {
        // Literal brackets in a path are data, only the rule is a glob
        let rules = IgnoreRules::new(&["*.bak"]).unwrap();
        assert!(rules.matches(Path::new("/home/u/[x]/a.bak"), false).ignored);
        assert!(!rules.matches(Path::new("/home/u/[x]/a.txt"), false).ignored);
    }

    #[test]
    fn test_same_basename_in_two_apps() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("backup")).unwrap();
        fs::create_dir_all(home.path().join("a")).unwrap();
        fs::create_dir_all(home.path().join("b")).unwrap();
        fs::write(home.path().join("a/config"), "from a").unwrap();
        fs::write(home.path().join("b/config"), "from b").unwrap();

        let mut config = single_app_config("alpha", &["~/a/config"]);
        config.custom_apps.insert(
            "beta".to_string(),
            AppConfig {
                paths: vec!["~/b/config".to_string()],
                pre_backup_script: None,
            },
        );
        backup(home.path(), &config);

        assert_eq!(fs::read_to_string(home.path().join("backup/alpha/config")).unwrap(), "from a");
        assert_eq!(fs::read_to_string(home.path().join("backup/beta/config")).unwrap(), "from b");
    }

    #[test]
    fn test_ignored_file_root_is_not_copied() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("backup")).unwrap();
        fs::write(home.path().join(".history.log"), "lots").unwrap();

        let mut config = single_app_config("shell", &["~/.history.log"]);
        config.global_ignores = vec!["*.log".to_string()];
        let report = backup(home.path(), &config);

        assert_eq!(report.apps[0].paths_skipped, 1);
        assert!(!home.path().join("backup/shell").exists());
        assert!(!report.manifest_written);
    }

    #[test]
    fn test_restore_without_manifest_still_restores_content() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("backup/git")).unwrap();
        fs::write(home.path().join("backup/git/.gitconfig"), "[user]").unwrap();

        let report = RestoreBuilder::new(single_app_config("git", &["~/.gitconfig"]))
            .resolver(Arc::new(FixedHome::new(home.path())))
            .conflict_resolver(Box::new(FixedResolver(Resolution::Skip)))
            .build()
            .run()
            .unwrap();

        assert_eq!(report.restored(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(fs::read_to_string(home.path().join(".gitconfig")).unwrap(), "[user]");
    }
}
