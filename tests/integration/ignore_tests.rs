use cache_push::paths::{IndicatorSource, Normalizer, TrackedPaths};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    for file in [
        "build/app.apk",
        "build/app.apk.bak",
        "build/tmp/x",
        "build/tmpfoo/y",
        "build/outputs/deep/lib.apk",
        "src/main.rs",
    ] {
        let path = dir.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, file).unwrap();
    }
    dir
}

fn normalize(root: &Path, ignore: &str) -> TrackedPaths {
    Normalizer::new(root).normalize("./build\n./src", ignore).unwrap()
}

#[test]
fn test_glob_matches_file_name_anywhere() {
    let dir = tree();
    let tracked = normalize(dir.path(), "!*.apk");

    assert!(!tracked.contains_key(&dir.path().join("build/app.apk")));
    assert!(!tracked.contains_key(&dir.path().join("build/outputs/deep/lib.apk")));
    assert!(tracked.contains_key(&dir.path().join("build/app.apk.bak")));
}

#[test]
fn test_prefix_matches_whole_components() {
    let dir = tree();
    let tracked = normalize(dir.path(), "!./build/tmp");

    assert!(!tracked.contains_key(&dir.path().join("build/tmp")));
    assert!(!tracked.contains_key(&dir.path().join("build/tmp/x")));
    assert!(tracked.contains_key(&dir.path().join("build/tmpfoo/y")));
}

#[test]
fn test_double_star_crosses_directories() {
    let dir = tree();
    let pattern = format!("{}/build/**/*.apk", dir.path().display());
    let tracked = normalize(dir.path(), &pattern);

    assert_eq!(
        tracked.get(&dir.path().join("build/outputs/deep/lib.apk")),
        Some(&IndicatorSource::Untracked)
    );
    assert_eq!(
        tracked.get(&dir.path().join("src/main.rs")),
        Some(&IndicatorSource::Own)
    );
}

#[test]
fn test_single_star_stays_in_one_directory() {
    let dir = tree();
    let tracked = normalize(dir.path(), "!build/*.apk");

    assert!(!tracked.contains_key(&dir.path().join("build/app.apk")));
    assert!(tracked.contains_key(&dir.path().join("build/outputs/deep/lib.apk")));
}

#[test]
fn test_exclude_wins_over_skip() {
    let dir = tree();
    let tracked = normalize(dir.path(), "src\n!src");

    assert!(!tracked.contains_key(&dir.path().join("src/main.rs")));
    assert!(!tracked.contains_key(&dir.path().join("src")));
}

#[test]
fn test_skip_overrides_explicit_indicator() {
    let dir = tree();
    fs::write(dir.path().join("lockfile"), "v1").unwrap();
    let tracked = Normalizer::new(dir.path())
        .normalize("./src -> ./lockfile", "./src/main.rs")
        .unwrap();

    assert_eq!(
        tracked.get(&dir.path().join("src/main.rs")),
        Some(&IndicatorSource::Untracked)
    );
}

#[test]
fn test_invalid_glob_is_an_error() {
    let dir = tree();
    let result = Normalizer::new(dir.path()).normalize("./src", "[*");
    assert!(result.is_err());
}
