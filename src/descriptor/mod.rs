//! The cache descriptor: tracked path to change indicator.
//!
//! A descriptor is persisted as a flat JSON object. The previous run's copy is
//! read from disk, compared with the freshly computed one (see [`diff`]), and
//! the new copy is embedded as the last entry of the archive so the pull step
//! can restore it for the next run.
//!
//! ```json
//! {
//!   "/work/node_modules/left-pad/index.js": "7c0e6a4d2a3b0a1ea3d2f0b8f19e5c31",
//!   "/work/node_modules/.bin": "-"
//! }
//! ```

pub mod diff;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use diff::{compare, DiffResult};

/// Indicator value of paths that never invalidate the cache.
pub const UNTRACKED: &str = "-";

/// Descriptor and meta key of `path`.
///
/// Keys are UTF-8. A path that is not is converted lossily with a warning;
/// distinct paths may then share a key and only the last one survives.
#[must_use]
pub fn path_key(path: &Path) -> String {
    if let Some(key) = path.to_str() {
        return key.to_string();
    }
    let key = path.to_string_lossy().into_owned();
    log::warn!("Path is not valid UTF-8, tracking it as {}", key);
    key
}

/// Mapping from tracked path to indicator, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(BTreeMap<String, String>);

/// Errors that can occur while reading or writing a descriptor.
#[derive(thiserror::Error, Debug)]
pub enum DescriptorError {
    /// An I/O error occurred while accessing the descriptor file.
    #[error("I/O error for descriptor {path}: {source}")]
    Io {
        /// Descriptor file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The descriptor file is not a flat JSON object of strings.
    #[error("Failed to parse descriptor {path}: {source}")]
    Parse {
        /// Descriptor file
        path: PathBuf,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// The descriptor could not be serialized.
    #[error("Failed to serialize descriptor: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl Descriptor {
    /// Create an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the indicator of `path`, returning the previous one.
    pub fn insert(&mut self, path: impl Into<String>, indicator: impl Into<String>) -> Option<String> {
        self.0.insert(path.into(), indicator.into())
    }

    /// Indicator of `path`, if tracked.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    /// Number of tracked paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no path is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(path, indicator)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Read a descriptor from disk.
    ///
    /// A missing file is not an error: it means there is no previous cache, and
    /// `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Any other I/O failure, or content that is not a JSON object of strings.
    pub fn read(path: &Path) -> Result<Option<Self>, DescriptorError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DescriptorError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| DescriptorError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write the descriptor to disk as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Io`] if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), DescriptorError> {
        let json = self.to_json_pretty()?;
        fs::write(path, json).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Serialize to pretty JSON bytes.
    ///
    /// # Errors
    ///
    /// Only fails if serde_json does, which a string map never should.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, DescriptorError> {
        serde_json::to_vec_pretty(&self.0).map_err(DescriptorError::Serialize)
    }

    /// Group paths by indicator: `indicator -> [paths]`.
    #[must_use]
    pub fn indicator_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_indicator: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (path, indicator) in &self.0 {
            by_indicator
                .entry(indicator.clone())
                .or_default()
                .push(path.clone());
        }
        by_indicator
    }

    /// Inverse of [`Descriptor::indicator_map`].
    #[must_use]
    pub fn from_indicator_map(by_indicator: BTreeMap<String, Vec<String>>) -> Self {
        let mut descriptor = Self::new();
        for (indicator, paths) in by_indicator {
            for path in paths {
                descriptor.insert(path, indicator.clone());
            }
        }
        descriptor
    }
}

impl FromIterator<(String, String)> for Descriptor {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for Descriptor {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
