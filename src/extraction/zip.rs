use crate::error::{Result, StorageError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::paths::contained_entry_path;

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    fn extraction_failed(archive_path: &Path, reason: impl Into<String>) -> StorageError {
        StorageError::ExtractionFailed {
            archive: archive_path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Check every entry name before anything is written.
    ///
    /// One unsafe name rejects the whole archive so a hostile upload never
    /// produces a partial tree.
    fn validate_entry_names(
        archive: &zip::ZipArchive<std::fs::File>,
        archive_path: &Path,
        dest_path: &Path,
    ) -> Result<()> {
        for name in archive.file_names() {
            if contained_entry_path(dest_path, name).is_none() {
                warn!(?archive_path, entry = name, "rejecting archive with unsafe entry path");
                return Err(StorageError::UnsafeEntryPath {
                    archive: archive_path.to_path_buf(),
                    entry: name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_zip_entry(
        mut file: zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let entry_name = file.name().to_string();

        // Names were checked up front; this also goes through zip's own sanitizer
        let file_path = match (
            file.enclosed_name(),
            contained_entry_path(dest_path, &entry_name),
        ) {
            (Some(_), Some(path)) => path,
            _ => {
                return Err(StorageError::UnsafeEntryPath {
                    archive: archive_path.to_path_buf(),
                    entry: entry_name,
                }
                .into());
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path).map_err(|e| {
                Self::extraction_failed(archive_path, format!("failed to create directory: {e}"))
            })?;
            return Ok(None);
        }

        if file_path == dest_path {
            return Err(Self::extraction_failed(
                archive_path,
                format!("file entry {entry_name:?} resolves to the output directory"),
            )
            .into());
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Self::extraction_failed(
                    archive_path,
                    format!("failed to create parent directories: {e}"),
                )
            })?;
        }

        // File::create truncates, so re-extraction overwrites previous output
        let mut outfile = std::fs::File::create(&file_path).map_err(|e| {
            Self::extraction_failed(archive_path, format!("failed to create output file: {e}"))
        })?;

        std::io::copy(&mut file, &mut outfile).map_err(|e| {
            Self::extraction_failed(archive_path, format!("failed to extract {entry_name}: {e}"))
        })?;

        Ok(Some(file_path))
    }

    /// Extract every entry of a ZIP archive into `dest_path`
    ///
    /// Blocking; callers on the async runtime go through
    /// [`extract_archive`](super::extract_archive).
    pub fn try_extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        let file = std::fs::File::open(archive_path).map_err(|e| {
            Self::extraction_failed(archive_path, format!("failed to open ZIP archive: {e}"))
        })?;

        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Self::extraction_failed(archive_path, format!("failed to read ZIP archive: {e}"))
        })?;

        Self::validate_entry_names(&archive, archive_path, dest_path)?;

        std::fs::create_dir_all(dest_path).map_err(|e| {
            Self::extraction_failed(archive_path, format!("failed to create destination: {e}"))
        })?;

        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| {
                Self::extraction_failed(archive_path, format!("failed to read ZIP entry {i}: {e}"))
            })?;

            if let Some(file_path) = Self::extract_zip_entry(entry, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }
}
