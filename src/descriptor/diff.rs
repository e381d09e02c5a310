//! Comparison of the previous and current descriptors.

use super::{Descriptor, UNTRACKED};

/// Classification of every path seen in either descriptor.
///
/// The six buckets are disjoint and together cover the union of both key sets.
/// Each bucket is sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// New paths with a real indicator
    pub added: Vec<String>,
    /// Vanished paths that had a real indicator
    pub removed: Vec<String>,
    /// Paths whose indicator differs between runs
    pub changed: Vec<String>,
    /// Paths with the same indicator in both runs
    pub matching: Vec<String>,
    /// New untracked paths
    pub added_ignored: Vec<String>,
    /// Vanished untracked paths
    pub removed_ignored: Vec<String>,
}

impl DiffResult {
    /// True if a new cache archive is needed.
    ///
    /// Untracked churn (`*_ignored`) never counts.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    /// Total number of classified paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len()
            + self.removed.len()
            + self.changed.len()
            + self.matching.len()
            + self.added_ignored.len()
            + self.removed_ignored.len()
    }

    /// True if neither descriptor had any path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Log bucket sizes, then the paths of every non-empty bucket at debug level.
    pub fn log_report(&self) {
        log::warn!("Removed: {}", self.removed.len());
        log::warn!("Changed: {}", self.changed.len());
        log::warn!("Added: {}", self.added.len());
        log::debug!("Removed (ignored): {}", self.removed_ignored.len());
        log::debug!("Unchanged: {}", self.matching.len());
        log::debug!("Added (ignored): {}", self.added_ignored.len());

        for (label, paths) in [
            ("removed", &self.removed),
            ("changed", &self.changed),
            ("added", &self.added),
            ("removed (ignored)", &self.removed_ignored),
            ("added (ignored)", &self.added_ignored),
        ] {
            if paths.is_empty() {
                continue;
            }
            log::debug!("Files {}:", label);
            for path in paths {
                log::debug!("  {}", path);
            }
        }
    }
}

/// Classify every path of `old` and `new`.
///
/// A path missing from `new` is removed, a path missing from `old` is added;
/// either goes to its `*_ignored` bucket when its only indicator is `"-"`.
/// Paths present in both are `changed` or `matching` by indicator equality.
#[must_use]
pub fn compare(old: &Descriptor, new: &Descriptor) -> DiffResult {
    let mut result = DiffResult::default();
    let mut remaining = new.as_map().clone();

    for (path, old_indicator) in old.iter() {
        match remaining.remove(path) {
            None if old_indicator == UNTRACKED => result.removed_ignored.push(path.to_string()),
            None => result.removed.push(path.to_string()),
            Some(new_indicator) if new_indicator != old_indicator => {
                result.changed.push(path.to_string());
            }
            Some(_) => result.matching.push(path.to_string()),
        }
    }

    for (path, new_indicator) in remaining {
        if new_indicator == UNTRACKED {
            result.added_ignored.push(path);
        } else {
            result.added.push(path);
        }
    }

    result
}
