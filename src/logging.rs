//! Logging infrastructure.
//!
//! Structured logging through the `log` facade with the `env_logger` backend.
//! The level is determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. `--quiet` (error only) or the verbosity count (debug/trace)
//! 3. Default: info level
//!
//! The `is_debug_mode` step input is folded into the verbosity count by the
//! caller, see [`effective_verbosity`].
//!
//! # Line layout
//!
//! CI logs are read top to bottom next to other steps, so by default info
//! lines carry only the message and other levels get a short tag. Debug
//! builds always tag. `-vv` adds a millisecond timestamp and the module path.
//!
//! # Example
//!
//! ```rust,no_run
//! use cache_push::logging::{effective_verbosity, init_logging};
//!
//! let verbose = effective_verbosity(0, true);
//! init_logging(verbose, false);
//! log::debug!("visible because debug mode is on");
//! ```

use env_logger::Builder;
use log::{Level, LevelFilter};
use std::env;
use std::io::Write;

/// Initialize the logging subsystem.
///
/// Call once, before any logging calls are made.
///
/// # Arguments
///
/// * `verbose` - Verbosity count (0=info, 1=debug, 2+=trace)
/// * `quiet` - If true, only show errors (overridden by `RUST_LOG`)
///
/// # Panics
///
/// Panics if called more than once, as `env_logger` can only be
/// initialized once per process.
pub fn init_logging(verbose: u8, quiet: bool) {
    let use_env = env::var("RUST_LOG").is_ok();

    let mut builder = Builder::new();
    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    configure_format(&mut builder, verbose);
    builder.init();

    if use_env {
        log::debug!(
            "Logging initialized from RUST_LOG: {:?}",
            env::var("RUST_LOG").ok()
        );
    } else {
        log::debug!("Logging initialized at level: {}", current_level_name());
    }
}

/// Verbosity after folding in the debug-mode step input.
#[must_use]
pub fn effective_verbosity(verbose: u8, debug_mode: bool) -> u8 {
    if debug_mode {
        verbose.max(1)
    } else {
        verbose
    }
}

/// Determine the log level from CLI flags.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// How much decoration each log line gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineLayout {
    /// Bare message for info, level tag for everything else
    Plain,
    /// Level tag on every line
    Tagged,
    /// Timestamp, level tag and module path
    Traced,
}

fn line_layout(verbose: u8, debug_build: bool) -> LineLayout {
    if verbose >= 2 {
        LineLayout::Traced
    } else if debug_build {
        LineLayout::Tagged
    } else {
        LineLayout::Plain
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    let layout = line_layout(verbose, cfg!(debug_assertions));

    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);

        match layout {
            LineLayout::Plain if level == Level::Info => writeln!(buf, "{}", record.args()),
            LineLayout::Plain | LineLayout::Tagged => {
                writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
            }
            LineLayout::Traced => {
                let timestamp = buf.timestamp_millis();
                writeln!(
                    buf,
                    "{} {style}{:<5}{style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("cache_push"),
                    record.args()
                )
            }
        }
    });
}

/// Current maximum log level as a lowercase name.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
