//! Archive extraction
//!
//! Expands a merged upload into its output directory. Entry names inside an
//! archive are untrusted: every name is checked to resolve inside the output
//! directory before a single byte is written, and one bad name fails the
//! whole extraction. The archive is deleted only after a fully successful
//! extraction; on any error it stays on disk for inspection and retry.

mod paths;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use zip::ZipExtractor;

use crate::error::{Result, StorageError};
use crate::types::ArchiveType;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

/// Extract `archive_path` into `dest_path`, then delete the archive.
///
/// Extraction runs on the blocking pool. Existing files at destination paths
/// are overwritten, so calling this again after a failure is safe.
///
/// # Returns
/// * `Ok(Vec<PathBuf>)` - Files written, in archive order
/// * `Err(Error)` - Malformed or unsupported archive, unsafe entry path, or I/O
///   failure. The archive is left in place.
pub async fn extract_archive(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
    let archive_type = ArchiveType::from_path(archive_path).ok_or_else(|| {
        StorageError::UnsupportedArchive {
            archive: archive_path.to_path_buf(),
        }
    })?;

    info!(?archive_path, ?dest_path, ?archive_type, "extracting archive");

    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();
    let files = spawn_blocking(move || match archive_type {
        ArchiveType::Zip => ZipExtractor::try_extract(&archive_owned, &dest_owned),
    })
    .await
    .map_err(|e| StorageError::ExtractionFailed {
        archive: archive_path.to_path_buf(),
        reason: format!("extraction task panicked: {e}"),
    })?;

    let files = match files {
        Ok(files) => files,
        Err(e) => {
            warn!(?archive_path, error = %e, "extraction failed, keeping archive");
            return Err(e);
        }
    };

    tokio::fs::remove_file(archive_path)
        .await
        .map_err(|e| StorageError::CleanupFailed {
            path: archive_path.to_path_buf(),
            reason: e.to_string(),
        })?;

    info!(
        ?archive_path,
        extracted_count = files.len(),
        "archive extracted and removed"
    );

    Ok(files)
}
