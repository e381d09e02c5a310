//! Filesystem probe: MD5 content hashes and modification times.
//!
//! # Overview
//! Files are streamed through a fixed 64 KiB buffer, so arbitrarily large
//! cache entries are hashed without being loaded into memory. The file is
//! always consumed to the end.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

use md5::{Digest, Md5};

use super::{FileProbe, FingerprintError};

/// Read buffer size for content hashing.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// [`FileProbe`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FileProbe for FsProbe {
    fn content_hash(&self, path: &Path) -> Result<String, FingerprintError> {
        let file = File::open(path).map_err(|e| FingerprintError::from_io(path, e))?;
        hash_reader(file).map_err(|e| FingerprintError::from_io(path, e))
    }

    fn mod_time(&self, path: &Path) -> Result<i64, FingerprintError> {
        let modified = path
            .metadata()
            .and_then(|meta| meta.modified())
            .map_err(|e| FingerprintError::from_io(path, e))?;

        let secs = match modified.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            Err(before) => {
                // round towards negative infinity like a signed Unix timestamp
                let before = before.duration();
                let whole = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
                if before.subsec_nanos() > 0 {
                    -whole - 1
                } else {
                    -whole
                }
            }
        };
        Ok(secs)
    }
}

/// Hex encoded MD5 digest of everything `reader` yields.
///
/// # Errors
///
/// Propagates read errors. Interrupted reads are retried.
pub fn hash_reader(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0_u8; BUFFER_SIZE];
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
