//! Chunk Store
//!
//! Holding area for in-flight chunks. Each upload owns one directory,
//! `<root>/<fileName>_chunks`, with one file per chunk index named
//! `chunk_<index>`. The directory contents are the source of truth for
//! which chunks have arrived, so completion detection survives restarts and
//! works across independent workers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result, StorageError};
use crate::types::UploadKey;

const CHUNK_PREFIX: &str = "chunk_";

/// File name of the slot for `index`
pub(crate) fn chunk_file_name(index: u32) -> String {
    format!("{CHUNK_PREFIX}{index}")
}

/// Parse a slot file name back into its index.
///
/// Only the canonical spelling is accepted (`chunk_7`, not `chunk_07`), so an
/// index can be present at most once.
pub(crate) fn parse_chunk_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?;
    let index: u32 = digits.parse().ok()?;
    (index.to_string() == digits).then_some(index)
}

/// On-disk chunk storage rooted at the upload directory
#[derive(Clone, Debug)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Upload root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Session directory for `key`
    pub fn session_dir(&self, key: &UploadKey) -> PathBuf {
        key.chunk_dir(&self.root)
    }

    /// Slot path for chunk `index` of `key`
    pub fn chunk_path(&self, key: &UploadKey, index: u32) -> PathBuf {
        self.session_dir(key).join(chunk_file_name(index))
    }

    /// Write (or overwrite) chunk `index` of `key`.
    ///
    /// The payload goes to a uniquely named temporary file first and is then
    /// renamed onto its slot, so a concurrent merge never reads a half-written
    /// chunk and a retransmitted index simply replaces the previous copy.
    pub async fn put_chunk(
        &self,
        key: &UploadKey,
        index: u32,
        total_chunks: u32,
        data: &[u8],
    ) -> Result<PathBuf> {
        if index >= total_chunks {
            return Err(Error::ChunkIndexOutOfRange {
                index,
                total: total_chunks,
            });
        }

        let write_error = |e: std::io::Error| StorageError::ChunkWrite {
            key: key.to_string(),
            index,
            reason: e.to_string(),
        };

        let session_dir = self.session_dir(key);
        tokio::fs::create_dir_all(&session_dir)
            .await
            .map_err(write_error)?;

        let slot = session_dir.join(chunk_file_name(index));
        let staging = session_dir.join(format!(
            ".{}.{}.part",
            chunk_file_name(index),
            Uuid::new_v4()
        ));

        if let Err(e) = tokio::fs::write(&staging, data).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(write_error(e).into());
        }
        if let Err(e) = tokio::fs::rename(&staging, &slot).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(write_error(e).into());
        }

        debug!(
            upload_key = %key,
            chunk_index = index,
            total_chunks,
            bytes = data.len(),
            "stored chunk"
        );

        Ok(slot)
    }

    /// Indices in `[0, total_chunks)` currently present on disk for `key`
    pub async fn present_indices(
        &self,
        key: &UploadKey,
        total_chunks: u32,
    ) -> Result<BTreeSet<u32>> {
        let session_dir = self.session_dir(key);
        let scan_error = |e: std::io::Error| StorageError::ScanFailed {
            path: session_dir.clone(),
            reason: e.to_string(),
        };

        let mut entries = match tokio::fs::read_dir(&session_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(scan_error(e).into()),
        };

        let mut present = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
            let Some(index) = entry.file_name().to_str().and_then(parse_chunk_file_name) else {
                continue;
            };
            if index >= total_chunks {
                continue;
            }
            // Entries can vanish mid-scan if the session is being cleaned up
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {
                    present.insert(index);
                }
                _ => {}
            }
        }

        Ok(present)
    }

    /// True iff every index in `[0, total_chunks)` is on disk
    pub async fn is_complete(&self, key: &UploadKey, total_chunks: u32) -> Result<bool> {
        let present = self.present_indices(key, total_chunks).await?;
        Ok(present.len() == total_chunks as usize)
    }

    /// Remove the session directory of `key`. A missing directory is not an error.
    pub async fn remove_session(&self, key: &UploadKey) -> Result<()> {
        let session_dir = self.session_dir(key);
        match tokio::fs::remove_dir_all(&session_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::CleanupFailed {
                path: session_dir,
                reason: e.to_string(),
            }
            .into()),
        }
    }
}
