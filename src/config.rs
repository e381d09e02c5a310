//! Layered configuration.
//!
//! Sources, lowest to highest priority:
//!
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. the step inputs in the process environment (`cache_paths`,
//!    `cache_api_url`, ..., `BITRISEIO_STACK_ID`)
//! 4. command-line flags
//!
//! After merging, paths announced by other steps through
//! `bitrise_cache_include_paths` and `bitrise_cache_exclude_paths` are
//! appended to the include and ignore specifications.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintMethod;
use crate::upload::UploadOptions;

/// Environment variable holding the stack identifier.
pub const STACK_ID_ENV: &str = "BITRISEIO_STACK_ID";

/// Include paths appended by other steps.
pub const EXTRA_INCLUDE_ENV: &str = "bitrise_cache_include_paths";

/// Ignore patterns appended by other steps.
pub const EXTRA_IGNORE_ENV: &str = "bitrise_cache_exclude_paths";

/// Step inputs read from the environment under their own name.
const STEP_INPUTS: &[&str] = &[
    "cache_paths",
    "ignore_check_on_paths",
    "cache_api_url",
    "fingerprint_method",
    "compress_archive",
    "is_debug_mode",
];

/// Resolved configuration of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Include specification, one `path [-> indicator]` per line
    pub cache_paths: String,
    /// Ignore specification, one `[!]pattern` per line
    pub ignore_check_on_paths: String,
    /// Upload destination, `file://` or the cache API
    pub cache_api_url: String,
    /// How indicators are computed
    pub fingerprint_method: FingerprintMethod,
    /// Gzip the archive
    pub compress_archive: bool,
    /// Debug level logging
    pub is_debug_mode: bool,
    /// CI stack identifier embedded in the archive
    pub stack_id: String,
    /// Where the archive is written
    pub archive_path: PathBuf,
    /// Previous descriptor on disk, and the descriptor's path in the archive
    pub descriptor_path: PathBuf,
    /// Previous cache meta on disk, and the meta's path in the archive
    pub meta_path: PathBuf,
    /// Timestamp file written by the pull step
    pub pull_end_time_path: PathBuf,
    /// Timeout of the upload URL request, in seconds
    pub upload_timeout_secs: u64,
    /// Delay before retrying a failed upload, in seconds
    pub upload_retry_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_paths: String::new(),
            ignore_check_on_paths: String::new(),
            cache_api_url: String::new(),
            fingerprint_method: FingerprintMethod::default(),
            compress_archive: false,
            is_debug_mode: false,
            stack_id: String::new(),
            archive_path: PathBuf::from("/tmp/cache-archive.tar"),
            descriptor_path: PathBuf::from("/tmp/cache-info.json"),
            meta_path: PathBuf::from("/tmp/cache-meta.json"),
            pull_end_time_path: PathBuf::from("/tmp/cache_pull_end_time"),
            upload_timeout_secs: 20,
            upload_retry_delay_secs: 3,
        }
    }
}

/// Command-line overrides, merged over every other source.
///
/// Unset options are skipped during serialization so they never mask a value
/// from the environment or the config file.
#[derive(Debug, Clone, Default, clap::Args, Serialize)]
pub struct ConfigOverrides {
    /// Include specification (newline separated `path [-> indicator]`)
    #[arg(long, value_name = "SPEC")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_paths: Option<String>,

    /// Ignore specification (newline separated `[!]pattern`)
    #[arg(long = "ignore-paths", value_name = "SPEC")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_check_on_paths: Option<String>,

    /// Upload destination (file:// path or cache API URL)
    #[arg(long, value_name = "URL")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_api_url: Option<String>,

    /// Change indicator method
    #[arg(long, value_enum, value_name = "METHOD")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_method: Option<FingerprintMethod>,

    /// Gzip the archive
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub compress_archive: bool,

    /// Enable debug logging
    #[arg(long = "debug")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_debug_mode: bool,

    /// CI stack identifier
    #[arg(long, value_name = "ID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,

    /// Where to write the archive
    #[arg(long, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,

    /// Previous descriptor location
    #[arg(long, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor_path: Option<PathBuf>,
}

/// Errors that can occur while loading the configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is missing or empty.
    #[error("Missing required setting: {field}")]
    Missing {
        /// Setting name
        field: String,
    },

    /// A setting has an invalid value.
    #[error("Invalid value for {field}: {message}")]
    Invalid {
        /// Setting name
        field: String,
        /// Why the value was rejected
        message: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        let field = if err.path.is_empty() {
            "configuration".to_string()
        } else {
            err.path.join(".")
        };
        Self::Invalid {
            field,
            message: err.kind.to_string(),
        }
    }
}

impl Config {
    /// Merged figment of every source except the extra env lists.
    #[must_use]
    pub fn figment(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(step_env())
            .merge(Serialized::defaults(overrides))
    }

    /// Load, extend and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending setting.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(ConfigError::Invalid {
                    field: "config".to_string(),
                    message: format!("config file not found: {}", path.display()),
                });
            }
        }

        let mut config: Self = Self::figment(config_file, overrides).extract()?;
        config.append_extra_paths();
        config.validate()?;
        Ok(config)
    }

    /// Append the include and ignore lists other steps exported.
    pub fn append_extra_paths(&mut self) {
        if let Ok(extra) = std::env::var(EXTRA_INCLUDE_ENV) {
            append_lines(&mut self.cache_paths, &extra);
        }
        if let Ok(extra) = std::env::var(EXTRA_IGNORE_ENV) {
            append_lines(&mut self.ignore_check_on_paths, &extra);
        }
    }

    /// Check required settings.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_api_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache_api_url".to_string(),
            });
        }
        if self.upload_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "upload_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Upload tunables derived from this configuration.
    #[must_use]
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            timeout: Duration::from_secs(self.upload_timeout_secs),
            retry_delay: Duration::from_secs(self.upload_retry_delay_secs),
        }
    }

    /// Log the effective settings at info level.
    pub fn log_summary(&self) {
        log::info!("Configs:");
        log::info!("- cache_paths: {}", self.cache_paths.replace('\n', ", "));
        log::info!(
            "- ignore_check_on_paths: {}",
            self.ignore_check_on_paths.replace('\n', ", ")
        );
        log::info!(
            "- cache_api_url: {}",
            crate::upload::redact_url(&self.cache_api_url)
        );
        log::info!("- fingerprint_method: {}", self.fingerprint_method);
        log::info!("- compress_archive: {}", self.compress_archive);
        log::info!("- is_debug_mode: {}", self.is_debug_mode);
        log::info!("- stack_id: {}", self.stack_id);
    }
}

fn step_env() -> Env {
    Env::raw().filter_map(|key| {
        let key = key.as_str();
        if key.eq_ignore_ascii_case(STACK_ID_ENV) {
            Some("stack_id".into())
        } else if STEP_INPUTS.iter().any(|input| key.eq_ignore_ascii_case(input)) {
            Some(key.to_ascii_lowercase().into())
        } else {
            None
        }
    })
}

fn append_lines(spec: &mut String, extra: &str) {
    let extra = extra.trim();
    if extra.is_empty() {
        return;
    }
    if !spec.is_empty() && !spec.ends_with('\n') {
        spec.push('\n');
    }
    spec.push_str(extra);
}
