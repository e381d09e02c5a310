//! Streaming archive writer.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header, HeaderMode};

use super::ArchiveError;
use crate::descriptor::Descriptor;
use crate::identity::{ArchiveInfo, ARCHIVE_INFO_PATH};

/// Byte sink below the tar layer.
enum Sink {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(file) => file.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(file) => file.flush(),
            Self::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Writes tracked paths and metadata entries into a tar (or tar.gz) file.
///
/// The writer must be finished with [`ArchiveWriter::close`]. Dropping it
/// releases the file handle but leaves a truncated, unusable archive.
///
/// # Example
///
/// ```no_run
/// use cache_push::archive::ArchiveWriter;
/// use cache_push::identity::ArchiveInfo;
/// use std::path::{Path, PathBuf};
///
/// let mut archive = ArchiveWriter::open(Path::new("/tmp/cache-archive.tar"), true)?;
/// archive.write_identity(&ArchiveInfo::current("linux-docker"))?;
/// archive.write(&[PathBuf::from("/work/node_modules")])?;
/// archive.close()?;
/// # Ok::<(), cache_push::archive::ArchiveError>(())
/// ```
pub struct ArchiveWriter {
    path: PathBuf,
    builder: Builder<Sink>,
    entries: usize,
}

impl ArchiveWriter {
    /// Create the archive at `path`, gzip compressed at best level if `compress`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Open`] if the file cannot be created.
    pub fn open(path: &Path, compress: bool) -> Result<Self, ArchiveError> {
        let file = File::create(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let sink = if compress {
            Sink::Gzip(GzEncoder::new(file, Compression::best()))
        } else {
            Sink::Plain(file)
        };

        let mut builder = Builder::new(sink);
        builder.follow_symlinks(false);
        builder.preserve_absolute(true);

        Ok(Self {
            path: path.to_path_buf(),
            builder,
            entries: 0,
        })
    }

    /// Path of the archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written so far, metadata included.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Append every path, in the given order.
    ///
    /// # Errors
    ///
    /// Stops at the first path that cannot be archived.
    pub fn write<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), ArchiveError> {
        for path in paths {
            self.write_one(path.as_ref())?;
        }
        Ok(())
    }

    /// Append one path without following symlinks.
    ///
    /// Regular files carry their full content; symlinks carry their target;
    /// directories and special files are written as header-only entries.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Entry`] if the path cannot be inspected or read.
    pub fn write_one(&mut self, path: &Path) -> Result<(), ArchiveError> {
        let entry_err = |source| ArchiveError::Entry {
            path: path.to_path_buf(),
            source,
        };

        let meta = path.symlink_metadata().map_err(entry_err)?;

        let mut header = Header::new_gnu();
        header.set_metadata_in_mode(&meta, HeaderMode::Complete);

        let file_type = meta.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(entry_err)?;
            header.set_size(0);
            self.builder
                .append_link(&mut header, path, &target)
                .map_err(entry_err)?;
        } else if file_type.is_file() {
            let file = File::open(path).map_err(entry_err)?;
            header.set_size(meta.len());
            self.builder
                .append_data(&mut header, path, file.take(meta.len()))
                .map_err(entry_err)?;
        } else {
            if file_type.is_dir() {
                header.set_entry_type(EntryType::Directory);
            }
            header.set_size(0);
            self.builder
                .append_data(&mut header, path, io::empty())
                .map_err(entry_err)?;
        }

        self.entries += 1;
        Ok(())
    }

    /// Append a synthetic regular entry holding `data` at `virtual_path`.
    ///
    /// The entry has mode `0600` and the current time as mtime.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Entry`] if the tar layer fails.
    pub fn write_metadata_entry(&mut self, data: &[u8], virtual_path: &Path) -> Result<(), ArchiveError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_mtime(now);

        self.builder
            .append_data(&mut header, virtual_path, data)
            .map_err(|source| ArchiveError::Entry {
                path: virtual_path.to_path_buf(),
                source,
            })?;

        self.entries += 1;
        Ok(())
    }

    /// Append the identity record. Call this before any other entry.
    ///
    /// # Errors
    ///
    /// Fails if the record cannot be encoded or written.
    pub fn write_identity(&mut self, info: &ArchiveInfo) -> Result<(), ArchiveError> {
        if self.entries > 0 {
            log::warn!("Identity record is not the first archive entry");
        }
        let json = info.to_json().map_err(|source| ArchiveError::Metadata {
            entry: ARCHIVE_INFO_PATH.to_string(),
            source,
        })?;
        self.write_metadata_entry(&json, Path::new(ARCHIVE_INFO_PATH))
    }

    /// Append the descriptor at `virtual_path`. Call this last.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be encoded or written.
    pub fn write_descriptor(&mut self, descriptor: &Descriptor, virtual_path: &Path) -> Result<(), ArchiveError> {
        let json = serde_json::to_vec_pretty(descriptor).map_err(|source| ArchiveError::Metadata {
            entry: virtual_path.display().to_string(),
            source,
        })?;
        self.write_metadata_entry(&json, virtual_path)
    }

    /// Finish the tar stream, then the gzip stream, then sync the file.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Finish`] naming the first layer that failed.
    pub fn close(self) -> Result<(), ArchiveError> {
        let sink = self
            .builder
            .into_inner()
            .map_err(|source| ArchiveError::Finish { layer: "tar", source })?;

        let file = match sink {
            Sink::Plain(file) => file,
            Sink::Gzip(encoder) => encoder
                .finish()
                .map_err(|source| ArchiveError::Finish { layer: "gzip", source })?,
        };

        file.sync_all()
            .map_err(|source| ArchiveError::Finish { layer: "file", source })?;
        log::debug!("Closed archive {}", self.path.display());
        Ok(())
    }
}
