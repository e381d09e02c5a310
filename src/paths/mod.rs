//! Path normalization: from raw include/ignore specifications to the set of
//! tracked paths and the fingerprint source of each.
//!
//! This module provides functionality for:
//! - Parsing the newline separated include and ignore specifications
//! - Resolving `~`, `$VAR` and relative paths to absolute, clean paths
//! - Expanding directories into their files, links and subdirectories
//! - Applying exclude (`!pattern`) and skip (`pattern`) rules
//!
//! # Architecture
//!
//! - [`parse`]: line parsing, no filesystem access
//! - [`resolve`]: lexical path resolution
//! - [`expand`]: recursive directory expansion with `lstat` semantics
//! - [`matcher`]: glob and prefix ignore rules
//!
//! # Example
//!
//! ```no_run
//! use cache_push::paths::{IndicatorSource, Normalizer};
//!
//! let normalizer = Normalizer::from_current_dir()?;
//! let tracked = normalizer.normalize(
//!     "./node_modules -> ./package-lock.json\n~/.gradle/caches",
//!     "!*.tmp\n~/.gradle/caches/journal-1",
//! )?;
//! for (path, source) in &tracked {
//!     if matches!(source, IndicatorSource::Untracked) {
//!         println!("{} (never invalidates)", path.display());
//!     }
//! }
//! # Ok::<(), cache_push::paths::PathError>(())
//! ```

pub mod expand;
pub mod matcher;
pub mod parse;
pub mod resolve;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

pub use expand::{expand_path, ExpandedPath};
pub use matcher::{match_rules, IgnoreRule};
pub use parse::{parse_ignore_list, parse_include_list};

/// Where the change indicator of a tracked path comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorSource {
    /// Cached verbatim, never invalidates the cache (indicator `"-"`)
    Untracked,
    /// The path is its own fingerprint source
    Own,
    /// A separate indicator file, typically a lockfile
    File(PathBuf),
}

impl IndicatorSource {
    /// The file to fingerprint for `path`, or `None` when untracked.
    #[must_use]
    pub fn resolve<'a>(&'a self, path: &'a Path) -> Option<&'a Path> {
        match self {
            Self::Untracked => None,
            Self::Own => Some(path),
            Self::File(file) => Some(file),
        }
    }
}

/// Normalized tracked paths mapped to their fingerprint source.
///
/// Ordered by path so every consumer (descriptor, archive) sees the same
/// sequence for the same input.
pub type TrackedPaths = BTreeMap<PathBuf, IndicatorSource>;

/// Errors that can occur during path normalization.
#[derive(thiserror::Error, Debug)]
pub enum PathError {
    /// Walking an include path failed.
    #[error("Failed to walk {path}: {source}")]
    Walk {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying walk error
        #[source]
        source: walkdir::Error,
    },

    /// An I/O error occurred while inspecting a path.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An ignore pattern is not a valid glob.
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// The underlying glob error
        #[source]
        source: globset::Error,
    },

    /// The working directory could not be determined.
    #[error("Failed to determine the working directory: {0}")]
    CurrentDir(#[source] io::Error),
}

/// Resolve and expand every include entry.
///
/// Regular files take their entry's indicator (or themselves). Symlinks and
/// directories are always [`IndicatorSource::Untracked`]. Entries whose path
/// is missing, or whose indicator is missing or a directory, are dropped with a
/// warning.
///
/// # Errors
///
/// Walking an existing include path is mandatory: any failure aborts.
pub fn normalize_include(
    items: &BTreeMap<String, Option<String>>,
    base: &Path,
) -> Result<TrackedPaths, PathError> {
    let mut tracked = TrackedPaths::new();

    for (raw_path, raw_indicator) in items {
        let path = resolve::absolute_from(raw_path, base);

        match path.symlink_metadata() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Cache path does not exist, skipping: {}", path.display());
                continue;
            }
            Err(source) => return Err(PathError::Io { path, source }),
        }

        let source = match raw_indicator {
            Some(raw_indicator) => match indicator_file(raw_indicator, base) {
                Some(indicator) => IndicatorSource::File(indicator),
                None => continue,
            },
            None => IndicatorSource::Own,
        };

        let expanded = expand_path(&path)?;
        log::debug!(
            "Expanded {} into {} entries",
            path.display(),
            expanded.len()
        );

        for file in expanded.regular_files {
            tracked.insert(file, source.clone());
        }
        for untracked in expanded.symlinks.into_iter().chain(expanded.dirs) {
            tracked.insert(untracked, IndicatorSource::Untracked);
        }
    }

    Ok(tracked)
}

/// Resolve an indicator path, or `None` (with a warning) if it is unusable.
fn indicator_file(raw: &str, base: &Path) -> Option<PathBuf> {
    let indicator = resolve::absolute_from(raw, base);
    match indicator.metadata() {
        Ok(meta) if meta.is_dir() => {
            log::warn!(
                "Indicator is a directory, skipping entry: {}",
                indicator.display()
            );
            None
        }
        Ok(_) => Some(indicator),
        Err(e) => {
            log::warn!(
                "Indicator is not accessible, skipping entry: {} ({})",
                indicator.display(),
                e
            );
            None
        }
    }
}

/// Compile the parsed ignore list into rules.
///
/// # Errors
///
/// Returns [`PathError::InvalidPattern`] for the first glob that fails to compile.
pub fn normalize_ignore(
    items: &BTreeMap<String, bool>,
    base: &Path,
) -> Result<Vec<IgnoreRule>, PathError> {
    items
        .iter()
        .map(|(pattern, exclude)| IgnoreRule::new(pattern, *exclude, base))
        .collect()
}

/// Apply the ignore rules to the tracked paths.
///
/// Excluded paths are removed. Skipped paths stay but become
/// [`IndicatorSource::Untracked`], even if their entry named an indicator file.
#[must_use]
pub fn interleave(tracked: TrackedPaths, rules: &[IgnoreRule]) -> TrackedPaths {
    tracked
        .into_iter()
        .filter_map(|(path, source)| match match_rules(&path, rules) {
            Some(true) => {
                log::trace!("Excluded: {}", path.display());
                None
            }
            Some(false) => Some((path, IndicatorSource::Untracked)),
            None => Some((path, source)),
        })
        .collect()
}

/// Runs the whole normalization against a fixed base directory.
#[derive(Debug, Clone)]
pub struct Normalizer {
    base: PathBuf,
}

impl Normalizer {
    /// Create a normalizer resolving relative paths against `base`.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Create a normalizer for the process working directory.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::CurrentDir`] if the working directory is unavailable.
    pub fn from_current_dir() -> Result<Self, PathError> {
        std::env::current_dir()
            .map(Self::new)
            .map_err(PathError::CurrentDir)
    }

    /// Base directory for relative paths.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Normalize the raw include and ignore specifications.
    ///
    /// # Errors
    ///
    /// Fails on walk errors and invalid glob patterns.
    pub fn normalize(&self, include_spec: &str, ignore_spec: &str) -> Result<TrackedPaths, PathError> {
        let include = parse_include_list(include_spec);
        let ignore = parse_ignore_list(ignore_spec);

        let rules = normalize_ignore(&ignore, &self.base)?;
        let tracked = normalize_include(&include, &self.base)?;
        let before = tracked.len();
        let tracked = interleave(tracked, &rules);

        log::debug!(
            "Normalized {} include entries into {} paths ({} excluded)",
            include.len(),
            tracked.len(),
            before - tracked.len()
        );
        Ok(tracked)
    }
}
