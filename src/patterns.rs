//! Gitignore-style exclusion rules
//!
//! The global ignore list of the configuration is compiled once into
//! [`IgnoreRules`] and then consulted for every entry a backup visits.
//!
//! ## Rule syntax
//!
//! - Blank lines and lines starting with `#` are skipped
//! - Leading and trailing whitespace is trimmed; a trailing space survives
//!   when escaped as `\ `
//! - A leading `!` negates the rule
//! - A trailing `/` restricts the rule to directories (the slash is dropped)
//! - A leading `/` anchors the rule to the filesystem root; any other rule
//!   matches at any depth, as if prefixed with `**/`
//! - `*`, `?` and character classes never cross a `/`; `**` does
//!
//! Paths are always matched in absolute, forward-slash form.
//!
//! ## Evaluation order
//!
//! The last rule that matches a path decides: an exclusion ignores it, a
//! negation keeps it. A negation therefore only overrides exclusions listed
//! above it; one listed before the rule it is meant to override has no
//! effect. Paths no rule matches are kept.
//!
//! ```text
//! *.log            # ignore every log file
//! !important.log   # ...except this one
//! build/           # ignore build directories, not files named build
//! /etc/secrets     # only this absolute path
//! ```

use crate::error::{GitbakError, Result};
use crate::utils;
use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;
use tracing::trace;

/// A single compiled rule
#[derive(Debug, Clone)]
struct Rule {
    /// Pattern after trimming, negation and slash stripping
    pattern: String,
    negate: bool,
    dir_only: bool,
    matcher: GlobMatcher,
}

impl Rule {
    fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        self.matcher.is_match(path)
    }
}

/// Outcome of matching one path
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IgnoreMatch {
    /// Whether the path is excluded
    pub ignored: bool,
    /// The deciding rule: the last matching rule, if any matched
    pub rule: Option<String>,
}

impl IgnoreMatch {
    fn kept(rule: Option<String>) -> Self {
        Self { ignored: false, rule }
    }
}

/// Ordered, pre-compiled ignore rules
///
/// Cheap to share between threads: matching only reads the compiled globs.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Compile raw rule lines
    ///
    /// # Errors
    ///
    /// - [`GitbakError::InvalidPattern`] for the first rule that is not a valid glob
    ///
    /// # Example
    ///
    /// ```rust
    /// use gitbak::patterns::IgnoreRules;
    /// use std::path::Path;
    ///
    /// let rules = IgnoreRules::new(&["*.log", "!important.log"]).unwrap();
    /// assert!(rules.matches(Path::new("/home/u/app/debug.log"), false).ignored);
    /// assert!(!rules.matches(Path::new("/home/u/app/important.log"), false).ignored);
    /// ```
    pub fn new<S: AsRef<str>>(raw_rules: &[S]) -> Result<Self> {
        let mut rules = Vec::with_capacity(raw_rules.len());
        for raw in raw_rules {
            if let Some(rule) = compile_rule(raw.as_ref())? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    /// Rules that never ignore anything
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of effective rules (comments and blanks excluded)
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no effective rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide whether `path` is excluded
    ///
    /// `is_dir` tells directory-only rules whether they apply.
    pub fn matches(&self, path: &Path, is_dir: bool) -> IgnoreMatch {
        let normalized = utils::to_slash(path);

        match self.rules.iter().rev().find(|rule| rule.matches(&normalized, is_dir)) {
            Some(rule) if !rule.negate => {
                trace!("{} ignored by rule '{}'", normalized, rule.pattern);
                IgnoreMatch {
                    ignored: true,
                    rule: Some(rule.pattern.clone()),
                }
            }
            Some(rule) => IgnoreMatch::kept(Some(rule.pattern.clone())),
            None => IgnoreMatch::kept(None),
        }
    }
}

/// Compile and evaluate in one step
///
/// Convenience for one-off checks; callers matching many paths should build
/// [`IgnoreRules`] once.
pub fn should_ignore<S: AsRef<str>>(path: &Path, is_dir: bool, rules: &[S]) -> Result<IgnoreMatch> {
    Ok(IgnoreRules::new(rules)?.matches(path, is_dir))
}

/// Turn one raw line into a rule, `None` for blanks and comments
fn compile_rule(raw: &str) -> Result<Option<Rule>> {
    let line = raw.trim_start();
    if line.trim_end().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (negate, line) = match line.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, line),
    };

    let trimmed = line.trim_end();
    let mut pattern = if trimmed.len() < line.len() && trimmed.ends_with('\\') {
        // "foo\ " keeps exactly one trailing space
        format!("{} ", &trimmed[..trimmed.len() - 1])
    } else {
        trimmed.to_string()
    };

    let dir_only = pattern.ends_with('/');
    if dir_only {
        pattern.pop();
    }
    if pattern.is_empty() {
        return Ok(None);
    }

    let glob = if pattern.starts_with('/') || pattern == "**" || pattern.starts_with("**/") {
        pattern.clone()
    } else {
        format!("**/{}", pattern)
    };

    let matcher = GlobBuilder::new(&glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|e| GitbakError::invalid_pattern(raw, e.kind()))?
        .compile_matcher();

    Ok(Some(Rule {
        pattern,
        negate,
        dir_only,
        matcher,
    }))
}
