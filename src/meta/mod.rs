//! Cache meta: last access time of every cached path, used to prune paths
//! that no build has touched for a week.
//!
//! The meta travels inside the archive next to the descriptor. On the next
//! run the pull step extracts it to disk along with a timestamp marking the
//! end of the pull; any file whose access time is newer than that mark was
//! used by the build.
//!
//! ```json
//! { "/work/.gradle/caches/a.jar": { "AccessTime": 1700000000000 } }
//! ```
//!
//! Every input of the pruning decision is a small capability trait so the
//! policy can be tested with canned clocks and metadata.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::descriptor::path_key;
use crate::paths::TrackedPaths;

/// Paths not accessed for this long (milliseconds) are pruned.
pub const MAX_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Meta of one cached path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Last access time, Unix epoch milliseconds
    #[serde(rename = "AccessTime")]
    pub access_time: i64,
}

/// Path to meta, ordered by path.
pub type CacheMeta = BTreeMap<String, Meta>;

/// Errors that can occur while reading or writing the cache meta.
#[derive(thiserror::Error, Debug)]
pub enum MetaError {
    /// An I/O error occurred while reading a meta input.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The previous cache meta is not valid JSON.
    #[error("Failed to parse cache meta {path}: {source}")]
    Parse {
        /// Meta file
        path: PathBuf,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// The pull end time file does not hold an integer.
    #[error("Invalid pull end time in {path}: '{value}'")]
    InvalidPullEndTime {
        /// Timestamp file
        path: PathBuf,
        /// Content found
        value: String,
    },

    /// The cache meta could not be serialized.
    #[error("Failed to serialize cache meta: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Kind of a path as seen by `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Regular file (or anything that is not a directory or link)
    File,
    /// Directory
    Dir,
    /// Symbolic link
    Symlink,
}

/// Source of the previous run's cache meta.
pub trait MetaReader {
    /// The previous meta, `None` if there is none.
    ///
    /// # Errors
    ///
    /// Any failure other than the meta not existing.
    fn read_meta(&self) -> Result<Option<CacheMeta>, MetaError>;
}

/// Source of the pull step's end timestamp.
pub trait PullEndTimeReader {
    /// Epoch milliseconds, `None` if the pull step left no timestamp.
    ///
    /// # Errors
    ///
    /// Any failure other than the timestamp not existing.
    fn read_pull_end_time(&self) -> Result<Option<i64>, MetaError>;
}

/// Last access time of a path in epoch milliseconds.
pub trait AccessTimeProvider {
    /// # Errors
    ///
    /// Stat failures; the caller recovers from them.
    fn access_time(&self, path: &Path) -> io::Result<i64>;
}

/// Current time in epoch milliseconds.
pub trait Clock {
    /// Now.
    fn now_ms(&self) -> i64;
}

/// `lstat` style classification of a path.
pub trait FileInfoProvider {
    /// # Errors
    ///
    /// Stat failures; the caller recovers from them.
    fn kind(&self, path: &Path) -> io::Result<PathKind>;
}

/// Reads the meta JSON file at a fixed path.
#[derive(Debug, Clone)]
pub struct FsMetaReader {
    path: PathBuf,
}

impl FsMetaReader {
    /// Reader for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetaReader for FsMetaReader {
    fn read_meta(&self) -> Result<Option<CacheMeta>, MetaError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MetaError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| MetaError::Parse {
                path: self.path.clone(),
                source,
            })
    }
}

/// Reads the decimal timestamp left by the pull step.
#[derive(Debug, Clone)]
pub struct FsPullEndTimeReader {
    path: PathBuf,
}

impl FsPullEndTimeReader {
    /// Reader for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PullEndTimeReader for FsPullEndTimeReader {
    fn read_pull_end_time(&self) -> Result<Option<i64>, MetaError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MetaError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        content
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MetaError::InvalidPullEndTime {
                path: self.path.clone(),
                value: content.trim().to_string(),
            })
    }
}

/// Real filesystem and wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

fn epoch_ms(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
    }
}

impl AccessTimeProvider for SystemProbe {
    fn access_time(&self, path: &Path) -> io::Result<i64> {
        fs::metadata(path)?.accessed().map(epoch_ms)
    }
}

impl Clock for SystemProbe {
    fn now_ms(&self) -> i64 {
        epoch_ms(SystemTime::now())
    }
}

impl FileInfoProvider for SystemProbe {
    fn kind(&self, path: &Path) -> io::Result<PathKind> {
        let file_type = fs::symlink_metadata(path)?.file_type();
        Ok(if file_type.is_symlink() {
            PathKind::Symlink
        } else if file_type.is_dir() {
            PathKind::Dir
        } else {
            PathKind::File
        })
    }
}

/// Prunes stale paths and computes the meta of the new archive.
pub struct MetaGenerator {
    meta_reader: Box<dyn MetaReader>,
    pull_end_time_reader: Box<dyn PullEndTimeReader>,
    access_time_provider: Box<dyn AccessTimeProvider>,
    clock: Box<dyn Clock>,
    file_info_provider: Box<dyn FileInfoProvider>,
}

impl MetaGenerator {
    /// Generator reading the given files and the real filesystem.
    #[must_use]
    pub fn new(meta_path: &Path, pull_end_time_path: &Path) -> Self {
        Self {
            meta_reader: Box::new(FsMetaReader::new(meta_path)),
            pull_end_time_reader: Box::new(FsPullEndTimeReader::new(pull_end_time_path)),
            access_time_provider: Box::new(SystemProbe),
            clock: Box::new(SystemProbe),
            file_info_provider: Box::new(SystemProbe),
        }
    }

    /// Generator with every capability supplied by the caller.
    #[must_use]
    pub fn with_capabilities(
        meta_reader: Box<dyn MetaReader>,
        pull_end_time_reader: Box<dyn PullEndTimeReader>,
        access_time_provider: Box<dyn AccessTimeProvider>,
        clock: Box<dyn Clock>,
        file_info_provider: Box<dyn FileInfoProvider>,
    ) -> Self {
        Self {
            meta_reader,
            pull_end_time_reader,
            access_time_provider,
            clock,
            file_info_provider,
        }
    }

    /// Drop paths unused for [`MAX_AGE_MS`] and build the new meta.
    ///
    /// For each path:
    /// - directories and symlinks are kept, without meta
    /// - a failed access time lookup keeps the path, without meta
    /// - a path accessed after the pull finished gets its new access time
    /// - a path known to the previous meta is dropped once expired, otherwise
    ///   it keeps its previous access time
    /// - any other path gets its current access time
    ///
    /// # Errors
    ///
    /// Fails if the previous meta or the pull end time exist but are unreadable.
    pub fn filter_old_paths_and_update_meta(
        &self,
        tracked: TrackedPaths,
    ) -> Result<(CacheMeta, TrackedPaths), MetaError> {
        let previous = self.meta_reader.read_meta()?.unwrap_or_default();
        let pull_end_time = match self.pull_end_time_reader.read_pull_end_time()? {
            Some(time) => time,
            None => {
                log::debug!("No pull end time found, treating every path as accessed");
                0
            }
        };
        let now = self.clock.now_ms();

        let mut meta = CacheMeta::new();
        let mut kept = TrackedPaths::new();
        let mut pruned = 0_usize;

        for (path, source) in tracked {
            let key = path_key(&path);

            match self.file_info_provider.kind(&path) {
                Ok(PathKind::Dir | PathKind::Symlink) => {
                    kept.insert(path, source);
                    continue;
                }
                Ok(PathKind::File) => {}
                Err(e) => {
                    log::warn!("Failed to stat {}: {}", path.display(), e);
                    kept.insert(path, source);
                    continue;
                }
            }

            let access_time = match self.access_time_provider.access_time(&path) {
                Ok(time) => time,
                Err(e) => {
                    log::warn!("Failed to get access time of {}: {}", path.display(), e);
                    kept.insert(path, source);
                    continue;
                }
            };

            let access_time = if access_time > pull_end_time {
                access_time
            } else if let Some(old) = previous.get(&key) {
                if old.access_time.saturating_add(MAX_AGE_MS) < now {
                    log::debug!("Pruning unused path: {}", path.display());
                    pruned += 1;
                    continue;
                }
                old.access_time
            } else {
                access_time
            };

            meta.insert(key, Meta { access_time });
            kept.insert(path, source);
        }

        if pruned > 0 {
            log::info!("Removed {} paths not used in the last 7 days", pruned);
        }
        Ok((meta, kept))
    }
}

/// Serialize the meta to JSON bytes.
///
/// # Errors
///
/// Only fails if serde_json does.
pub fn to_json(meta: &CacheMeta) -> Result<Vec<u8>, MetaError> {
    serde_json::to_vec(meta).map_err(MetaError::Serialize)
}
