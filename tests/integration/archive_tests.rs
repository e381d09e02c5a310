use cache_push::archive::{list_entries, peek_identity, read_descriptor, read_entry, ArchiveWriter, EntryKind};
use cache_push::descriptor::Descriptor;
use cache_push::fingerprint::{FingerprintEngine, FingerprintMethod};
use cache_push::identity::{ArchiveInfo, ARCHIVE_INFO_PATH};
use cache_push::paths::Normalizer;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DESCRIPTOR_PATH: &str = "/tmp/cache-info.json";

fn build_tree(root: &Path) {
    fs::create_dir_all(root.join("deps/pkg/lib")).unwrap();
    fs::create_dir_all(root.join("deps/empty")).unwrap();
    fs::write(root.join("deps/pkg/lib/index.js"), "module.exports = 1;\n").unwrap();
    fs::write(root.join("deps/pkg/package.json"), r#"{"name":"pkg"}"#).unwrap();
    let binary: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    fs::write(root.join("deps/blob.bin"), binary).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("pkg/lib/index.js", root.join("deps/entry.js")).unwrap();
}

fn write_archive(root: &Path, archive: &Path, compress: bool) -> Descriptor {
    let tracked = Normalizer::new(root).normalize("./deps", "").unwrap();
    let descriptor = FingerprintEngine::new(FingerprintMethod::FileContentHash)
        .descriptor(&tracked)
        .unwrap();

    let mut writer = ArchiveWriter::open(archive, compress).unwrap();
    writer.write_identity(&ArchiveInfo::current("linux-docker")).unwrap();
    let paths: Vec<&PathBuf> = tracked.keys().collect();
    writer.write(&paths).unwrap();
    writer
        .write_descriptor(&descriptor, Path::new(DESCRIPTOR_PATH))
        .unwrap();
    writer.close().unwrap();
    descriptor
}

fn unpack(archive: &Path, dest: &Path) {
    let file = File::open(archive).unwrap();
    let mut magic = [0u8; 2];
    std::io::Read::read_exact(&mut File::open(archive).unwrap(), &mut magic).unwrap();
    if magic == [0x1f, 0x8b] {
        tar::Archive::new(GzDecoder::new(file)).unpack(dest).unwrap();
    } else {
        tar::Archive::new(file).unpack(dest).unwrap();
    }
}

#[test]
fn test_round_trip_contents_links_and_descriptor() {
    for compress in [false, true] {
        let src = TempDir::new().unwrap();
        build_tree(src.path());
        let out = TempDir::new().unwrap();
        let archive = out.path().join("cache.tar");

        let written = write_archive(src.path(), &archive, compress);

        let restored = TempDir::new().unwrap();
        unpack(&archive, restored.path());
        let relocated = |p: &Path| restored.path().join(p.strip_prefix("/").unwrap());

        for file in ["deps/pkg/lib/index.js", "deps/pkg/package.json", "deps/blob.bin"] {
            let original = src.path().join(file);
            assert_eq!(
                fs::read(relocated(&original)).unwrap(),
                fs::read(&original).unwrap(),
                "{file} differs (compress={compress})"
            );
        }
        assert!(relocated(&src.path().join("deps/empty")).is_dir());

        #[cfg(unix)]
        assert_eq!(
            fs::read_link(relocated(&src.path().join("deps/entry.js"))).unwrap(),
            PathBuf::from("pkg/lib/index.js")
        );

        let embedded = read_descriptor(&archive, Path::new(DESCRIPTOR_PATH))
            .unwrap()
            .unwrap();
        assert_eq!(embedded, written);
    }
}

#[test]
fn test_identity_is_always_first() {
    let src = TempDir::new().unwrap();
    for i in 0..300 {
        let dir = src.path().join(format!("deps/d{}", i % 7));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("f{i}")), format!("{i}")).unwrap();
    }
    let out = TempDir::new().unwrap();
    let archive = out.path().join("cache.tar.gz");

    write_archive(src.path(), &archive, true);

    let entries = list_entries(&archive).unwrap();
    assert_eq!(entries[0].path, PathBuf::from(ARCHIVE_INFO_PATH));
    assert_eq!(entries.last().unwrap().path, PathBuf::from(DESCRIPTOR_PATH));
    assert!(entries.len() > 300);

    let identity = peek_identity(&archive).unwrap();
    assert_eq!(identity.version, 2);
    assert_eq!(identity.stack_id, "linux-docker");
    assert!(!identity.architecture.is_empty());
}

#[test]
fn test_entry_kinds_and_sizes() {
    let src = TempDir::new().unwrap();
    build_tree(src.path());
    let out = TempDir::new().unwrap();
    let archive = out.path().join("cache.tar");

    write_archive(src.path(), &archive, false);

    let entries = list_entries(&archive).unwrap();
    let find = |rel: &str| {
        let wanted = src.path().join(rel);
        entries
            .iter()
            .find(|e| e.path == wanted)
            .unwrap_or_else(|| panic!("{rel} not archived"))
    };

    let blob = find("deps/blob.bin");
    assert_eq!(blob.kind, EntryKind::File);
    assert_eq!(blob.size, 200_000);
    assert_eq!(find("deps/empty").kind, EntryKind::Directory);
    #[cfg(unix)]
    assert_eq!(find("deps/entry.js").kind, EntryKind::Symlink);

    let index = read_entry(&archive, &src.path().join("deps/pkg/lib/index.js"))
        .unwrap()
        .unwrap();
    assert_eq!(index, b"module.exports = 1;\n");
}
