//! Property-based testing for the ignore matcher
//!
//! Uses proptest to check matcher invariants over randomly generated paths
//! and rule lists.

use ::gitbak::*;
use proptest::prelude::*;
use std::path::PathBuf;

/// Generate absolute paths of 1-5 lowercase components
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    prop::collection::vec("[a-z]{1,8}(\\.[a-z]{1,3})?", 1..=5).prop_map(|parts| {
        let mut path = PathBuf::from("/");
        for part in parts {
            path.push(part);
        }
        path
    })
}

/// Generate simple rule bodies (no negation)
fn rule_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}".prop_map(|s| s),
        "\\*\\.[a-z]{1,3}".prop_map(|s| s),
        "[a-z]{1,4}\\*".prop_map(|s| s),
        "[a-z]{1,6}/".prop_map(|s| s),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_no_rules_never_ignore(path in path_strategy(), is_dir in any::<bool>()) {
        let rules = IgnoreRules::empty();
        prop_assert!(!rules.matches(&path, is_dir).ignored);
    }

    #[test]
    fn prop_exact_basename_is_ignored(path in path_strategy(), is_dir in any::<bool>()) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let rules = IgnoreRules::new(&[name.clone()]).unwrap();
        let decision = rules.matches(&path, is_dir);
        prop_assert!(decision.ignored);
        prop_assert_eq!(decision.rule, Some(name));
    }

    #[test]
    fn prop_trailing_negation_of_same_rule_keeps(
        path in path_strategy(),
        rules in prop::collection::vec(rule_strategy(), 0..6),
    ) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let mut raw = rules.clone();
        raw.push(format!("!{}", name));
        let compiled = IgnoreRules::new(&raw).unwrap();
        prop_assert!(!compiled.matches(&path, false).ignored);
    }

    #[test]
    fn prop_leading_negation_has_no_effect(
        path in path_strategy(),
        rules in prop::collection::vec(rule_strategy(), 1..6),
        is_dir in any::<bool>(),
    ) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let plain = IgnoreRules::new(&rules).unwrap();
        let mut with_negation = vec![format!("!{}", name)];
        with_negation.extend(rules.iter().cloned());
        let negated_first = IgnoreRules::new(&with_negation).unwrap();

        prop_assert_eq!(
            plain.matches(&path, is_dir).ignored,
            negated_first.matches(&path, is_dir).ignored
        );
    }

    #[test]
    fn prop_directory_rules_skip_files(path in path_strategy()) {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let rules = IgnoreRules::new(&[format!("{}/", name)]).unwrap();
        prop_assert!(!rules.matches(&path, false).ignored);
        prop_assert!(rules.matches(&path, true).ignored);
    }

    #[test]
    fn prop_matching_is_deterministic(
        path in path_strategy(),
        rules in prop::collection::vec(rule_strategy(), 0..8),
        is_dir in any::<bool>(),
    ) {
        let compiled = IgnoreRules::new(&rules).unwrap();
        let one_shot = should_ignore(&path, is_dir, &rules).unwrap();
        prop_assert_eq!(compiled.matches(&path, is_dir), one_shot);
    }
}
