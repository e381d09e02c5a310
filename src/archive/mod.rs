//! Cache archive: a tar stream, optionally gzip compressed.
//!
//! Entry order is fixed:
//!
//! 1. the identity record ([`crate::identity::ARCHIVE_INFO_PATH`])
//! 2. every tracked file, symlink and directory
//! 3. the cache meta, when present
//! 4. the descriptor
//!
//! Members keep their absolute names (`/work/dir/file`), so the pull step
//! restores them in place with `tar -xP`. Names longer than the header slot
//! go through a GNU long-name entry. The [`reader`] also accepts members
//! stored without the leading `/`.
//!
//! # Architecture
//!
//! - [`writer`]: [`ArchiveWriter`], streaming entries into the container
//! - [`reader`]: identity peek, descriptor read-back and entry listing

pub mod reader;
pub mod writer;

use std::io;
use std::path::{Component, Path, PathBuf};

pub use reader::{list_entries, peek_identity, read_descriptor, read_entry, ArchiveEntry, EntryKind};
pub use writer::ArchiveWriter;

/// Errors that can occur while writing or reading an archive.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    /// The archive file could not be created or opened.
    #[error("Failed to open archive {path}: {source}")]
    Open {
        /// Archive file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A tracked path could not be added.
    #[error("Failed to archive {path}: {source}")]
    Entry {
        /// Tracked path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Finalizing one of the layers (tar, gzip, file) failed.
    #[error("Failed to finalize archive ({layer}): {source}")]
    Finish {
        /// Layer that failed
        layer: &'static str,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Reading the archive failed.
    #[error("Failed to read archive {path}: {source}")]
    Read {
        /// Archive file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An expected entry is missing or out of place.
    #[error("Archive {path} has no {entry} entry where expected")]
    MissingEntry {
        /// Archive file
        path: PathBuf,
        /// In-archive path of the entry
        entry: String,
    },

    /// A metadata entry could not be encoded or decoded.
    #[error("Invalid metadata entry {entry}: {source}")]
    Metadata {
        /// In-archive path of the entry
        entry: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Absolute path of a tar member, whether it was stored rooted or not.
#[must_use]
pub fn rooted(member: &Path) -> PathBuf {
    let relative: PathBuf = member
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_) | Component::CurDir))
        .collect();
    Path::new("/").join(relative)
}
