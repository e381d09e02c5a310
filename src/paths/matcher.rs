//! Ignore rule matching.
//!
//! A pattern containing `*` is a shell glob: `*` stays within one path
//! component and `**` crosses separators. Globs without a `/` are matched
//! against the file name only, so `*.apk` catches `build/app.apk` anywhere in
//! the tree. Every other pattern is a literal path prefix compared component by
//! component: `build/tmp` covers `build/tmp/x` but not `build/tmpfoo`.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use super::resolve;
use super::PathError;

/// How an ignore rule decides whether a path matches.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Shell glob. `basename` globs are tested against the last component.
    Glob {
        /// Compiled matcher
        matcher: GlobMatcher,
        /// Match against the file name instead of the full path
        basename: bool,
    },
    /// Absolute path prefix
    Prefix(PathBuf),
}

/// One parsed line of the ignore specification.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    /// Pattern as written by the user
    pub raw: String,
    /// Compiled pattern
    pub pattern: Pattern,
    /// `true` drops matching paths from the cache, `false` only stops them
    /// from invalidating it
    pub exclude: bool,
}

impl IgnoreRule {
    /// Compile `raw` into a rule, resolving relative patterns against `base`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidPattern`] if the glob does not compile.
    pub fn new(raw: &str, exclude: bool, base: &Path) -> Result<Self, PathError> {
        let pattern = if raw.contains('*') {
            compile_glob(raw, base)?
        } else {
            Pattern::Prefix(resolve::absolute_from(raw, base))
        };

        Ok(Self {
            raw: raw.to_string(),
            pattern,
            exclude,
        })
    }

    /// Check whether `path` (absolute, cleaned) is covered by this rule.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        match &self.pattern {
            Pattern::Glob { matcher, basename } => {
                if *basename {
                    path.file_name().is_some_and(|name| matcher.is_match(name))
                } else {
                    matcher.is_match(path)
                }
            }
            Pattern::Prefix(prefix) => path.starts_with(prefix),
        }
    }
}

fn compile_glob(raw: &str, base: &Path) -> Result<Pattern, PathError> {
    let expanded = resolve::expand_vars(raw);
    let basename = !expanded.contains('/');

    let glob = if basename || expanded.starts_with('/') || expanded.starts_with("**") {
        expanded
    } else {
        let mut relative = expanded.as_str();
        while let Some(rest) = relative.strip_prefix("./") {
            relative = rest;
        }
        base.join(relative).to_string_lossy().into_owned()
    };

    let matcher = GlobBuilder::new(&glob)
        .literal_separator(true)
        .build()
        .map_err(|source| PathError::InvalidPattern {
            pattern: raw.to_string(),
            source,
        })?
        .compile_matcher();

    Ok(Pattern::Glob { matcher, basename })
}

/// Apply every rule to `path`.
///
/// Returns `None` when nothing matches, `Some(true)` when an exclude rule
/// matches, and `Some(false)` when only skip rules match. Exclusion always
/// wins over skipping.
#[must_use]
pub fn match_rules(path: &Path, rules: &[IgnoreRule]) -> Option<bool> {
    let mut result = None;
    for rule in rules.iter().filter(|rule| rule.matches(path)) {
        if rule.exclude {
            return Some(true);
        }
        result = Some(false);
    }
    result
}
