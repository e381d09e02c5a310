//! Read-back helpers for archives produced by [`super::ArchiveWriter`].
//!
//! Compression is detected from the gzip magic bytes, so callers do not need
//! to know how the archive was written.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use super::{rooted, ArchiveError};
use crate::descriptor::Descriptor;
use crate::identity::{ArchiveInfo, ARCHIVE_INFO_PATH};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Kind of an archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Anything else (FIFO, device, hard link)
    Other,
}

impl From<EntryType> for EntryKind {
    fn from(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Regular | EntryType::Continuous => Self::File,
            EntryType::Directory => Self::Directory,
            EntryType::Symlink => Self::Symlink,
            _ => Self::Other,
        }
    }
}

/// One member of an archive, with its absolute path restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Absolute path
    pub path: PathBuf,
    /// Member kind
    pub kind: EntryKind,
    /// Content size in bytes
    pub size: u64,
    /// Permission bits
    pub mode: u32,
    /// Symlink target, for links
    pub link_target: Option<PathBuf>,
}

fn open(path: &Path) -> Result<Archive<Box<dyn Read>>, ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(|source| ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut magic = [0_u8; 2];
    let compressed = match file.read_exact(&mut magic) {
        Ok(()) => magic == GZIP_MAGIC,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(read_err(e)),
    };
    file.seek(SeekFrom::Start(0)).map_err(read_err)?;

    let reader: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(Archive::new(reader))
}

/// Read only the first entry and decode it as the identity record.
///
/// # Errors
///
/// Returns [`ArchiveError::MissingEntry`] if the first entry is anything else.
pub fn peek_identity(path: &Path) -> Result<ArchiveInfo, ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    };
    let missing = || ArchiveError::MissingEntry {
        path: path.to_path_buf(),
        entry: ARCHIVE_INFO_PATH.to_string(),
    };

    let mut archive = open(path)?;
    let mut entries = archive.entries().map_err(read_err)?;
    let mut first = match entries.next() {
        Some(entry) => entry.map_err(read_err)?,
        None => return Err(missing()),
    };

    if rooted(&first.path().map_err(read_err)?) != Path::new(ARCHIVE_INFO_PATH) {
        return Err(missing());
    }

    let mut data = Vec::new();
    first.read_to_end(&mut data).map_err(read_err)?;
    ArchiveInfo::from_json(&data).map_err(|source| ArchiveError::Metadata {
        entry: ARCHIVE_INFO_PATH.to_string(),
        source,
    })
}

/// Content of the member stored for `virtual_path`, or `None` if absent.
///
/// The last matching member wins, in line with how tar extraction behaves.
///
/// # Errors
///
/// Returns [`ArchiveError::Read`] on I/O or format errors.
pub fn read_entry(path: &Path, virtual_path: &Path) -> Result<Option<Vec<u8>>, ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    };
    let wanted = rooted(virtual_path);

    let mut archive = open(path)?;
    let mut found = None;
    for entry in archive.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        if rooted(&entry.path().map_err(read_err)?) == wanted {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(read_err)?;
            found = Some(data);
        }
    }
    Ok(found)
}

/// Descriptor embedded at `virtual_path`, or `None` if the archive has none.
///
/// # Errors
///
/// Read errors, or a descriptor entry that is not valid JSON.
pub fn read_descriptor(path: &Path, virtual_path: &Path) -> Result<Option<Descriptor>, ArchiveError> {
    read_entry(path, virtual_path)?
        .map(|data| {
            serde_json::from_slice(&data).map_err(|source| ArchiveError::Metadata {
                entry: virtual_path.display().to_string(),
                source,
            })
        })
        .transpose()
}

/// List every member in archive order.
///
/// # Errors
///
/// Returns [`ArchiveError::Read`] on I/O or format errors.
pub fn list_entries(path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut archive = open(path)?;
    let mut listed = Vec::new();
    for entry in archive.entries().map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let header = entry.header();
        listed.push(ArchiveEntry {
            path: rooted(&entry.path().map_err(read_err)?),
            kind: header.entry_type().into(),
            size: header.size().map_err(read_err)?,
            mode: header.mode().map_err(read_err)?,
            link_target: entry
                .link_name()
                .map_err(read_err)?
                .map(|target| target.into_owned()),
        });
    }
    Ok(listed)
}
