use crate::error::{Error, StorageError};
use crate::extraction::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a ZIP archive containing the given (name, content) entries
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap();
}

/// Create a ZIP archive with a directory entry followed by a nested file
fn create_zip_with_dir(archive_path: &Path) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Deflated);
    writer.add_directory("segments/", options).unwrap();
    writer.start_file("segments/seg_000.ts", options).unwrap();
    writer.write_all(b"segment zero").unwrap();
    writer.finish().unwrap();
}

/// Every regular file under `root`, relative to it
fn files_under(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

// ---------------------------------------------------------------------------
// ZipExtractor::try_extract
// ---------------------------------------------------------------------------

#[test]
fn test_try_extract_writes_all_entries() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("video.zip");
    let dest = temp.path().join("video");
    create_zip_archive(
        &archive,
        &[
            ("output.m3u8", b"#EXTM3U\n"),
            ("encryption.key", &[0u8, 1, 2, 3]),
            ("seg/000.ts", b"ts-data"),
        ],
    );

    let files = ZipExtractor::try_extract(&archive, &dest).unwrap();

    assert_eq!(files.len(), 3);
    assert_eq!(
        files_under(&dest),
        vec!["encryption.key", "output.m3u8", "seg/000.ts"]
    );
    assert_eq!(std::fs::read(dest.join("encryption.key")).unwrap(), vec![0, 1, 2, 3]);
    // try_extract itself never deletes the archive
    assert!(archive.exists());
}

#[test]
fn test_try_extract_creates_directory_entries() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("dirs.zip");
    let dest = temp.path().join("dirs");
    create_zip_with_dir(&archive);

    let files = ZipExtractor::try_extract(&archive, &dest).unwrap();

    assert_eq!(files, vec![dest.join("segments").join("seg_000.ts")]);
    assert!(dest.join("segments").is_dir());
}

#[test]
fn test_try_extract_overwrites_existing_files() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("video.zip");
    let dest = temp.path().join("video");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("output.m3u8"), b"stale playlist with much longer content").unwrap();
    create_zip_archive(&archive, &[("output.m3u8", b"#EXTM3U\n")]);

    ZipExtractor::try_extract(&archive, &dest).unwrap();

    assert_eq!(std::fs::read(dest.join("output.m3u8")).unwrap(), b"#EXTM3U\n");
}

#[test]
fn test_try_extract_rejects_parent_traversal_without_writing() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("evil.zip");
    let dest = temp.path().join("out").join("evil");
    create_zip_archive(
        &archive,
        &[
            ("harmless.txt", b"first entry is fine"),
            ("../../escaped.txt", b"pwned"),
        ],
    );

    let err = ZipExtractor::try_extract(&archive, &dest).unwrap_err();

    match err {
        Error::Storage(StorageError::UnsafeEntryPath { entry, .. }) => {
            assert_eq!(entry, "../../escaped.txt");
        }
        other => panic!("expected UnsafeEntryPath, got {other:?}"),
    }
    assert!(!temp.path().join("escaped.txt").exists());
    assert!(!temp.path().join("out").join("escaped.txt").exists());
    // Nothing at all is written when any entry is unsafe
    assert!(!dest.exists());
}

#[test]
fn test_try_extract_rejects_absolute_entry() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("abs.zip");
    let dest = temp.path().join("abs");
    create_zip_archive(&archive, &[("/tmp/absolute.txt", b"nope")]);

    let err = ZipExtractor::try_extract(&archive, &dest).unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::UnsafeEntryPath { .. })
    ));
}

#[test]
fn test_try_extract_corrupt_archive() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("corrupt.zip");
    std::fs::write(&archive, b"this is not a zip archive").unwrap();

    let err = ZipExtractor::try_extract(&archive, &temp.path().join("corrupt")).unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::ExtractionFailed { .. })
    ));
}

#[test]
fn test_try_extract_missing_archive() {
    let temp = TempDir::new().unwrap();
    let err = ZipExtractor::try_extract(
        &temp.path().join("missing.zip"),
        &temp.path().join("missing"),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Storage(StorageError::ExtractionFailed { .. })
    ));
}

// ---------------------------------------------------------------------------
// extract_archive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_extract_archive_removes_archive_on_success() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("video.zip");
    let dest = temp.path().join("video");
    create_zip_archive(&archive, &[("output.m3u8", b"#EXTM3U\n")]);

    let files = extract_archive(&archive, &dest).await.unwrap();

    assert_eq!(files, vec![dest.join("output.m3u8")]);
    assert!(!archive.exists());
    assert!(dest.join("output.m3u8").is_file());
}

#[tokio::test]
async fn test_extract_archive_keeps_archive_on_failure() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("evil.zip");
    let dest = temp.path().join("evil");
    create_zip_archive(&archive, &[("..\\..\\escaped.txt", b"pwned")]);

    let result = extract_archive(&archive, &dest).await;

    assert!(result.is_err());
    assert!(archive.exists(), "failed extraction must keep the archive");
    assert!(!temp.path().join("escaped.txt").exists());
}

#[tokio::test]
async fn test_extract_archive_unsupported_extension() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("video.rar");
    std::fs::write(&archive, b"Rar!").unwrap();

    let err = extract_archive(&archive, &temp.path().join("video"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Storage(StorageError::UnsupportedArchive { .. })
    ));
    assert!(archive.exists());
}

#[tokio::test]
async fn test_extract_archive_retry_after_failure_succeeds() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("video.zip");
    let dest = temp.path().join("video");

    std::fs::write(&archive, b"truncated upload").unwrap();
    assert!(extract_archive(&archive, &dest).await.is_err());
    assert!(archive.exists());

    // A later merge overwrites the archive with good bytes
    create_zip_archive(&archive, &[("output.m3u8", b"#EXTM3U\n")]);
    extract_archive(&archive, &dest).await.unwrap();

    assert!(!archive.exists());
    assert_eq!(files_under(&dest), vec!["output.m3u8"]);
}
