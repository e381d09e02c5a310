//! Fingerprint engine: computes the change indicator of every tracked path.
//!
//! Many paths can share one fingerprint source (every file below
//! `node_modules` pointing at `package-lock.json`), so the engine groups paths
//! by source and hashes or stats each source exactly once.
//!
//! # Architecture
//!
//! - [`FileProbe`]: the filesystem capability the engine needs, replaceable in
//!   tests
//! - [`hasher`]: [`FsProbe`], the real implementation
//!
//! # Example
//!
//! ```no_run
//! use cache_push::fingerprint::{FingerprintEngine, FingerprintMethod};
//! use cache_push::paths::Normalizer;
//!
//! let tracked = Normalizer::from_current_dir()?.normalize("./node_modules -> ./package-lock.json", "")?;
//! let engine = FingerprintEngine::new(FingerprintMethod::FileContentHash);
//! let descriptor = engine.descriptor(&tracked)?;
//! println!("{} paths fingerprinted", descriptor.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod hasher;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::descriptor::{path_key, Descriptor};
use crate::paths::TrackedPaths;

pub use crate::descriptor::UNTRACKED;
pub use hasher::FsProbe;

/// How the indicator of a fingerprint source is computed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintMethod {
    /// Hex MD5 of the file content
    #[default]
    FileContentHash,
    /// Modification time in Unix seconds
    FileModTime,
}

impl FingerprintMethod {
    /// Configuration name of the method.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileContentHash => "file-content-hash",
            Self::FileModTime => "file-mod-time",
        }
    }
}

impl fmt::Display for FingerprintMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FingerprintMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "file-content-hash" => Ok(Self::FileContentHash),
            "file-mod-time" => Ok(Self::FileModTime),
            other => Err(format!(
                "invalid fingerprint method '{other}', expected file-content-hash or file-mod-time"
            )),
        }
    }
}

/// Errors that can occur while fingerprinting.
///
/// All of them are fatal: caching without a valid indicator could restore a
/// stale cache later.
#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    /// The fingerprint source vanished after normalization.
    #[error("Fingerprint source not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the fingerprint source.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the fingerprint source.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl FingerprintError {
    /// Classify an I/O error on `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Filesystem access needed to compute indicators.
pub trait FileProbe {
    /// Hex encoded MD5 of the full file content.
    ///
    /// # Errors
    ///
    /// Any failure to open or read the file.
    fn content_hash(&self, path: &Path) -> Result<String, FingerprintError>;

    /// Modification time in Unix seconds.
    ///
    /// # Errors
    ///
    /// Any failure to stat the file.
    fn mod_time(&self, path: &Path) -> Result<i64, FingerprintError>;
}

/// Builds descriptors from tracked paths.
#[derive(Debug, Clone)]
pub struct FingerprintEngine<P = FsProbe> {
    method: FingerprintMethod,
    probe: P,
}

impl FingerprintEngine<FsProbe> {
    /// Create an engine reading the real filesystem.
    #[must_use]
    pub fn new(method: FingerprintMethod) -> Self {
        Self::with_probe(method, FsProbe)
    }
}

impl<P: FileProbe> FingerprintEngine<P> {
    /// Create an engine with a custom probe.
    #[must_use]
    pub fn with_probe(method: FingerprintMethod, probe: P) -> Self {
        Self { method, probe }
    }

    /// The configured method.
    #[must_use]
    pub fn method(&self) -> FingerprintMethod {
        self.method
    }

    /// Indicator of a single fingerprint source.
    ///
    /// # Errors
    ///
    /// Propagates the probe error.
    pub fn indicator(&self, source: &Path) -> Result<String, FingerprintError> {
        match self.method {
            FingerprintMethod::FileContentHash => self.probe.content_hash(source),
            FingerprintMethod::FileModTime => self.probe.mod_time(source).map(|t| t.to_string()),
        }
    }

    /// Compute the descriptor of `tracked`.
    ///
    /// Untracked paths get `"-"` without touching the filesystem. Every other
    /// path is grouped with the paths sharing its source; each source is
    /// probed once.
    ///
    /// # Errors
    ///
    /// The first source that cannot be hashed or stat-ed aborts the whole run.
    pub fn descriptor(&self, tracked: &TrackedPaths) -> Result<Descriptor, FingerprintError> {
        let mut paths_by_source: BTreeMap<Option<&Path>, Vec<String>> = BTreeMap::new();
        for (path, source) in tracked {
            paths_by_source
                .entry(source.resolve(path))
                .or_default()
                .push(path_key(path));
        }

        let mut paths_by_indicator: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (source, paths) in paths_by_source {
            let indicator = match source {
                Some(source) => self.indicator(source)?,
                None => UNTRACKED.to_string(),
            };
            log::trace!(
                "{} -> {} ({} paths)",
                source.map_or_else(|| UNTRACKED.into(), Path::to_string_lossy),
                indicator,
                paths.len()
            );
            paths_by_indicator.entry(indicator).or_default().extend(paths);
        }

        Ok(Descriptor::from_indicator_map(paths_by_indicator))
    }
}
