//! The cache push sequence.
//!
//! normalize → prune stale paths → fingerprint → diff → archive → upload
//!
//! Every phase logs its start, `- Done` and `- Took`. The run stops early,
//! successfully, when no path is tracked or when the previous descriptor
//! shows no actionable change.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use bytesize::ByteSize;

use crate::archive::ArchiveWriter;
use crate::config::Config;
use crate::descriptor::{self, Descriptor};
use crate::fingerprint::FingerprintEngine;
use crate::identity::ArchiveInfo;
use crate::meta::{self, CacheMeta, MetaGenerator};
use crate::paths::{Normalizer, TrackedPaths};
use crate::upload;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The include specification resolved to no path.
    NothingToCache,
    /// The previous descriptor matches; nothing was archived.
    Unchanged,
    /// A new archive was written and uploaded.
    Uploaded {
        /// Archive location on disk
        archive: PathBuf,
        /// Archive size in bytes
        size: u64,
        /// Number of tracked paths in the archive
        paths: usize,
    },
}

/// Run the push with relative paths resolved from the working directory.
///
/// # Errors
///
/// Any fatal error of any phase, with the phase as context.
pub fn run(config: &Config) -> anyhow::Result<Outcome> {
    let normalizer = Normalizer::from_current_dir().context("Failed to determine working directory")?;
    run_with(config, &normalizer)
}

/// Run the push with an explicit normalizer.
///
/// # Errors
///
/// Any fatal error of any phase, with the phase as context.
pub fn run_with(config: &Config, normalizer: &Normalizer) -> anyhow::Result<Outcome> {
    let total = Instant::now();

    log::info!("Cleaning paths");
    let started = Instant::now();
    let tracked = normalizer
        .normalize(&config.cache_paths, &config.ignore_check_on_paths)
        .context("Failed to normalize cache paths")?;
    phase_done(started.elapsed());

    if tracked.is_empty() {
        log::warn!("No paths to cache, nothing to push");
        return Ok(Outcome::NothingToCache);
    }
    log::info!("{} paths tracked", tracked.len());

    log::info!("Pruning stale paths");
    let started = Instant::now();
    let generator = MetaGenerator::new(&config.meta_path, &config.pull_end_time_path);
    let before = tracked.len();
    let (cache_meta, tracked) = generator
        .filter_old_paths_and_update_meta(tracked)
        .context("Failed to update cache meta")?;
    if tracked.len() < before {
        log::info!("{} paths not accessed recently were dropped", before - tracked.len());
    }
    phase_done(started.elapsed());

    log::info!("Checking previous cache status");
    let started = Instant::now();
    let engine = FingerprintEngine::new(config.fingerprint_method);
    let current = engine
        .descriptor(&tracked)
        .context("Failed to fingerprint tracked paths")?;

    let previous = Descriptor::read(&config.descriptor_path).with_context(|| {
        format!(
            "Failed to read previous cache descriptor {}",
            config.descriptor_path.display()
        )
    })?;
    phase_done(started.elapsed());

    match previous {
        Some(previous) => {
            let diff = descriptor::compare(&previous, &current);
            diff.log_report();
            if !diff.has_changes() {
                log::info!("No changes since the previous cache, skipping push");
                return Ok(Outcome::Unchanged);
            }
        }
        None => log::warn!("No previous cache descriptor, creating a new cache"),
    }

    log::info!("Creating archive");
    let started = Instant::now();
    write_archive(config, &tracked, &cache_meta, &current).context("Failed to create archive")?;
    phase_done(started.elapsed());

    let size = std::fs::metadata(&config.archive_path)
        .with_context(|| format!("Failed to stat archive {}", config.archive_path.display()))?
        .len();
    log::info!("Archive size: {} bytes ({})", size, ByteSize::b(size));

    log::info!("Uploading archive");
    let started = Instant::now();
    upload::upload_archive(&config.archive_path, &config.cache_api_url, config.upload_options())
        .context("Failed to upload archive")?;
    phase_done(started.elapsed());

    log::info!("Total time: {:.2?}", total.elapsed());
    Ok(Outcome::Uploaded {
        archive: config.archive_path.clone(),
        size,
        paths: tracked.len(),
    })
}

/// Write identity, tracked paths, meta and descriptor, in that order.
fn write_archive(
    config: &Config,
    tracked: &TrackedPaths,
    cache_meta: &CacheMeta,
    descriptor: &Descriptor,
) -> anyhow::Result<()> {
    let mut archive = ArchiveWriter::open(&config.archive_path, config.compress_archive)?;

    let identity = ArchiveInfo::current(config.stack_id.as_str());
    log::debug!("Archive identity: {}", identity);
    archive.write_identity(&identity)?;

    let paths: Vec<&Path> = tracked.keys().map(PathBuf::as_path).collect();
    archive.write(&paths)?;

    let meta_json = meta::to_json(cache_meta)?;
    archive.write_metadata_entry(&meta_json, &config.meta_path)?;
    archive.write_descriptor(descriptor, &config.descriptor_path)?;

    archive.close()?;
    Ok(())
}

fn phase_done(took: Duration) {
    log::info!("- Done");
    log::info!("- Took: {:.2?}", took);
}
