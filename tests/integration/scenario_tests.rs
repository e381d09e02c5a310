use cache_push::archive::read_descriptor;
use cache_push::config::Config;
use cache_push::descriptor::{compare, Descriptor, UNTRACKED};
use cache_push::fingerprint::FingerprintMethod;
use cache_push::paths::Normalizer;
use cache_push::pipeline::{run_with, Outcome};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MD5_V1: &str = "6654c734ccab8f440ff0825eb443dc7f";

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("dir")).unwrap();
    fs::write(dir.path().join("dir/file1"), "original").unwrap();
    fs::write(dir.path().join("dir/lockfile"), "v1").unwrap();
    dir
}

fn config(dir: &Path, cache_paths: &str, ignore: &str) -> Config {
    let state = dir.join(".state");
    fs::create_dir_all(&state).unwrap();
    Config {
        cache_paths: cache_paths.into(),
        ignore_check_on_paths: ignore.into(),
        cache_api_url: format!("file://{}", state.join("remote/cache.tar").display()),
        archive_path: state.join("archive.tar"),
        descriptor_path: state.join("cache-info.json"),
        meta_path: state.join("cache-meta.json"),
        pull_end_time_path: state.join("pull_end_time"),
        ..Config::default()
    }
}

/// Run a push, then put the embedded descriptor where the pull step would.
fn push(config: &Config, base: &Path) -> (Outcome, Option<Descriptor>) {
    let outcome = run_with(config, &Normalizer::new(base)).unwrap();
    let descriptor = match outcome {
        Outcome::Uploaded { .. } => {
            let descriptor = read_descriptor(&config.archive_path, &config.descriptor_path)
                .unwrap()
                .unwrap();
            descriptor.write(&config.descriptor_path).unwrap();
            Some(descriptor)
        }
        _ => None,
    };
    (outcome, descriptor)
}

fn key(path: impl AsRef<Path>) -> String {
    path.as_ref().to_string_lossy().into_owned()
}

#[test]
fn test_indicator_file_hides_content_changes() {
    let dir = project();
    let config = config(dir.path(), "./dir -> ./dir/lockfile", "");

    let (outcome, first) = push(&config, dir.path());
    assert!(matches!(outcome, Outcome::Uploaded { .. }));
    let first = first.unwrap();
    assert_eq!(first.get(&key(dir.path().join("dir/file1"))), Some(MD5_V1));
    assert_eq!(first.get(&key(dir.path().join("dir/lockfile"))), Some(MD5_V1));
    assert_eq!(first.get(&key(dir.path().join("dir"))), Some(UNTRACKED));

    fs::write(dir.path().join("dir/file1"), "edited").unwrap();

    let (outcome, _) = push(&config, dir.path());
    assert_eq!(outcome, Outcome::Unchanged);
}

#[test]
fn test_lockfile_change_invalidates_every_path() {
    let dir = project();
    let config = config(dir.path(), "./dir -> ./dir/lockfile", "");
    let (_, first) = push(&config, dir.path());

    fs::write(dir.path().join("dir/lockfile"), "v2").unwrap();

    let (outcome, second) = push(&config, dir.path());
    assert!(matches!(outcome, Outcome::Uploaded { .. }));
    let diff = compare(&first.unwrap(), &second.unwrap());
    assert_eq!(diff.changed.len(), 2);
    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
}

#[test]
fn test_self_indicating_file_change_is_detected() {
    let dir = project();
    let config = config(dir.path(), "./dir", "");
    let (_, first) = push(&config, dir.path());
    let first = first.unwrap();

    fs::write(dir.path().join("dir/file1"), "edited").unwrap();

    let (outcome, second) = push(&config, dir.path());
    assert!(matches!(outcome, Outcome::Uploaded { .. }));
    let diff = compare(&first, &second.unwrap());
    assert_eq!(diff.changed, vec![key(dir.path().join("dir/file1"))]);
    assert!(diff.has_changes());
}

#[test]
fn test_mod_time_method() {
    let dir = project();
    let config = Config {
        fingerprint_method: FingerprintMethod::FileModTime,
        ..config(dir.path(), "./dir/file1", "")
    };
    let file1 = dir.path().join("dir/file1");
    filetime::set_file_mtime(&file1, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let (_, first) = push(&config, dir.path());
    assert_eq!(first.unwrap().get(&key(&file1)), Some("1600000000"));

    // same mtime, different content: no change under mtime fingerprinting
    fs::write(&file1, "edited").unwrap();
    filetime::set_file_mtime(&file1, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    assert_eq!(push(&config, dir.path()).0, Outcome::Unchanged);
}

#[test]
fn test_exclude_versus_skip() {
    let dir = project();
    fs::write(dir.path().join("dir/app.log"), "log line").unwrap();
    let log_key = key(dir.path().join("dir/app.log"));

    let excluded = config(dir.path(), "./dir", "!*.log");
    let (_, descriptor) = push(&excluded, dir.path());
    assert_eq!(descriptor.unwrap().get(&log_key), None);

    let other = TempDir::new().unwrap();
    let skipped = config(other.path(), "./dir", "*.log");
    let (_, descriptor) = push(&skipped, dir.path());
    assert_eq!(descriptor.unwrap().get(&log_key), Some(UNTRACKED));
}

#[test]
fn test_skipped_churn_does_not_trigger_push() {
    let dir = project();
    fs::write(dir.path().join("dir/app.log"), "one").unwrap();
    let config = config(dir.path(), "./dir", "*.log");
    push(&config, dir.path());

    fs::write(dir.path().join("dir/app.log"), "two").unwrap();
    fs::write(dir.path().join("dir/new.log"), "new").unwrap();

    assert_eq!(push(&config, dir.path()).0, Outcome::Unchanged);
}

#[test]
fn test_removed_file_triggers_push() {
    let dir = project();
    let config = config(dir.path(), "./dir", "");
    push(&config, dir.path());

    fs::remove_file(dir.path().join("dir/file1")).unwrap();

    let (outcome, _) = push(&config, dir.path());
    assert!(matches!(outcome, Outcome::Uploaded { paths: 2, .. }));
}

#[test]
fn test_missing_indicator_drops_entry() {
    let dir = project();
    let config = config(dir.path(), "./dir -> ./missing.lock", "");

    let outcome = run_with(&config, &Normalizer::new(dir.path())).unwrap();
    assert_eq!(outcome, Outcome::NothingToCache);
}
