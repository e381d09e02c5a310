//! Recursive expansion of an include path into the entries it covers.
//!
//! Expansion walks with `lstat` semantics: symlinks are reported as links and
//! never followed, so a link pointing outside the tree cannot pull foreign
//! content into the cache. Sockets, FIFOs and device nodes are dropped.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::PathError;

/// Entries found below (and including) one include path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpandedPath {
    /// Regular files, fingerprinted according to their include entry
    pub regular_files: Vec<PathBuf>,
    /// Symbolic links, always untracked
    pub symlinks: Vec<PathBuf>,
    /// Directories, always untracked (kept so empty directories round-trip)
    pub dirs: Vec<PathBuf>,
}

impl ExpandedPath {
    /// Total number of entries across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regular_files.len() + self.symlinks.len() + self.dirs.len()
    }

    /// True if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expand `root` into its regular files, symlinks and directories.
///
/// A bare file (or link) is returned as its single entry. The walk is sorted by
/// file name so repeated runs see the same order.
///
/// # Errors
///
/// Any error while walking, including a permission error on a nested
/// directory, is returned as [`PathError::Walk`]. Callers treat this as fatal.
pub fn expand_path(root: &Path) -> Result<ExpandedPath, PathError> {
    let mut expanded = ExpandedPath::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|source| PathError::Walk {
            path: source
                .path()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf),
            source,
        })?;

        let file_type = entry.file_type();
        let path = entry.into_path();
        if file_type.is_symlink() {
            expanded.symlinks.push(path);
        } else if file_type.is_dir() {
            expanded.dirs.push(path);
        } else if file_type.is_file() {
            expanded.regular_files.push(path);
        } else {
            log::trace!("Dropping special file: {}", path.display());
        }
    }

    Ok(expanded)
}
