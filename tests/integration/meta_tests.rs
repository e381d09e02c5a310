use cache_push::archive::read_entry;
use cache_push::config::Config;
use cache_push::meta::{CacheMeta, Meta, MAX_AGE_MS};
use cache_push::paths::Normalizer;
use cache_push::pipeline::{run_with, Outcome};
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn config(state: &Path, cache_paths: &str) -> Config {
    Config {
        cache_paths: cache_paths.into(),
        cache_api_url: format!("file://{}", state.join("remote.tar").display()),
        archive_path: state.join("archive.tar"),
        descriptor_path: state.join("cache-info.json"),
        meta_path: state.join("cache-meta.json"),
        pull_end_time_path: state.join("pull_end_time"),
        ..Config::default()
    }
}

fn set_atime_ms(path: &Path, ms: i64) {
    filetime::set_file_atime(path, FileTime::from_unix_time(ms / 1000, 0)).unwrap();
}

#[test]
fn test_stale_paths_are_pruned_and_meta_is_archived() {
    let work = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let stale = work.path().join("deps/stale.bin");
    let used = work.path().join("deps/used.bin");
    let fresh = work.path().join("deps/fresh.bin");
    fs::create_dir_all(work.path().join("deps")).unwrap();
    for file in [&stale, &used, &fresh] {
        fs::write(file, "data").unwrap();
    }

    let now = now_ms();
    let pull_end = now - 60_000;
    let long_ago = now - MAX_AGE_MS - 86_400_000;
    fs::write(state.path().join("pull_end_time"), pull_end.to_string()).unwrap();

    // not touched since the pull and last seen more than a week ago
    set_atime_ms(&stale, long_ago);
    // read during this build
    set_atime_ms(&used, now);
    // not touched since the pull, but seen recently
    set_atime_ms(&fresh, pull_end - 120_000);

    let previous: CacheMeta = BTreeMap::from([
        (stale.display().to_string(), Meta { access_time: long_ago }),
        (fresh.display().to_string(), Meta { access_time: now - 3_600_000 }),
    ]);
    fs::write(
        state.path().join("cache-meta.json"),
        serde_json::to_vec(&previous).unwrap(),
    )
    .unwrap();

    let config = config(state.path(), "./deps");
    let outcome = run_with(&config, &Normalizer::new(work.path())).unwrap();
    assert!(matches!(outcome, Outcome::Uploaded { paths: 3, .. }), "{outcome:?}");

    let archived = read_entry(&config.archive_path, &stale).unwrap();
    assert!(archived.is_none(), "stale path must not be archived");
    assert!(read_entry(&config.archive_path, &used).unwrap().is_some());

    let meta_json = read_entry(&config.archive_path, &config.meta_path)
        .unwrap()
        .unwrap();
    let meta: CacheMeta = serde_json::from_slice(&meta_json).unwrap();
    assert!(!meta.contains_key(&stale.display().to_string()));
    assert_eq!(
        meta[&fresh.display().to_string()].access_time,
        now - 3_600_000
    );
    assert!(meta[&used.display().to_string()].access_time > pull_end);
    // the directory is archived but has no meta entry
    assert!(!meta.contains_key(&work.path().join("deps").display().to_string()));
}

#[test]
fn test_invalid_pull_end_time_is_fatal() {
    let work = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    fs::write(work.path().join("a"), "a").unwrap();
    fs::write(state.path().join("pull_end_time"), "yesterday").unwrap();

    let config = config(state.path(), "./a");
    let err = run_with(&config, &Normalizer::new(work.path())).unwrap_err();
    assert!(format!("{err:#}").contains("cache meta"));
}

#[test]
fn test_meta_uses_access_time_json_key() {
    let meta = Meta { access_time: 42 };
    assert_eq!(serde_json::to_string(&meta).unwrap(), r#"{"AccessTime":42}"#);
}
