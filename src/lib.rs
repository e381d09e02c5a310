//! cache-push - CI build cache uploader
//!
//! Archives the paths a build step wants cached and uploads the archive, but
//! only when something that matters changed since the previous run.
//!
//! # Overview
//!
//! - [`paths`]: include/ignore specifications to a tracked path set
//! - [`meta`]: drops paths that have not been accessed for a week
//! - [`fingerprint`]: content hash or mtime of every fingerprint source
//! - [`descriptor`]: the path to indicator map and its diff
//! - [`archive`]: tar (optionally gzip) writer and reader
//! - [`upload`]: `file://` copy or the two-step cache API
//! - [`pipeline`]: the sequence tying them together

pub mod archive;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod logging;
pub mod meta;
pub mod paths;
pub mod pipeline;
pub mod upload;

use anyhow::Context;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::ExitCode;

/// Load the configuration described by the command line.
///
/// # Errors
///
/// Wraps [`config::ConfigError`], so [`ExitCode::for_error`] maps it to
/// [`ExitCode::ConfigError`].
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    Config::load(cli.config.as_deref(), &cli.overrides).context("Invalid configuration")
}

/// Run one push with an already loaded configuration.
///
/// # Errors
///
/// Any fatal pipeline error.
pub fn run_app(config: &Config) -> anyhow::Result<ExitCode> {
    config.log_summary();
    let outcome = pipeline::run(config)?;
    log::debug!("Finished with {:?}", outcome);
    Ok(ExitCode::Success)
}
