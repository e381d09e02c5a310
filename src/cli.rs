//! Command-line interface definitions.
//!
//! Every step input can also come from the environment or a TOML file (see
//! [`crate::config`]); flags given here take precedence over both.
//!
//! # Example
//!
//! ```bash
//! # Inputs from the CI environment
//! cache_paths="$HOME/.gradle" cache_api_url="file:///tmp/cache.tar" cache-push
//!
//! # Everything on the command line, gzip compressed, debug logging
//! cache-push --cache-paths ./node_modules --cache-api-url file:///tmp/c.tar \
//!     --compress-archive -v
//! ```

use clap::Parser;
use std::path::PathBuf;

use crate::config::ConfigOverrides;

/// Archive build caches and upload them only when they changed.
#[derive(Debug, Parser)]
#[command(name = "cache-push")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// TOML file with step inputs
    #[arg(short, long, value_name = "FILE", env = "CACHE_PUSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Step input overrides
    #[command(flatten)]
    pub overrides: ConfigOverrides,
}
