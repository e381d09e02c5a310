//! Archive identity record.
//!
//! The first entry of every archive is a tiny JSON document describing the
//! environment that produced it, so the pull step can reject a cache built on a
//! different stack or CPU architecture after reading a few hundred bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current schema version of the identity record.
pub const ARCHIVE_INFO_VERSION: u64 = 2;

/// In-archive path of the identity record.
pub const ARCHIVE_INFO_PATH: &str = "/tmp/archive_info.json";

/// Identity of the environment that produced an archive.
///
/// Empty fields are omitted from the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Schema version
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: u64,
    /// CI stack identifier
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack_id: String,
    /// CPU architecture (`amd64`, `arm64`, ...)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl ArchiveInfo {
    /// Identity of the current process for `stack_id`.
    #[must_use]
    pub fn current(stack_id: impl Into<String>) -> Self {
        Self {
            version: ARCHIVE_INFO_VERSION,
            stack_id: stack_id.into(),
            architecture: go_arch().to_string(),
        }
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Only fails if serde_json does.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse the JSON form.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Display for ArchiveInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.stack_id, self.architecture)
    }
}

/// Architecture name as the pull step spells it.
#[must_use]
pub fn go_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        other => other,
    }
}
