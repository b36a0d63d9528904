//! Core types for hls-drop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Suffix of the per-upload chunk directory
pub const CHUNK_DIR_SUFFIX: &str = "_chunks";

const MAX_KEY_LEN: usize = 255;

/// Client-supplied file name identifying one logical upload
///
/// Always a single, non-traversing path component carrying a supported archive
/// extension, so every path derived from it stays directly under the upload root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UploadKey(String);

impl UploadKey {
    /// Validate a raw file name
    pub fn parse(raw: &str) -> Result<Self> {
        let reject = |reason: &str| Error::InvalidUploadKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(reject("file name is empty"));
        }
        if raw.len() > MAX_KEY_LEN {
            return Err(reject("file name is too long"));
        }
        if raw.contains(['/', '\\', '\0']) {
            return Err(reject("file name must not contain path separators"));
        }
        if raw == "." || raw == ".." || raw.starts_with('.') {
            return Err(reject("file name must not start with a dot"));
        }
        if ArchiveType::from_path(Path::new(raw)).is_none() {
            return Err(reject("unsupported archive extension"));
        }

        let key = Self(raw.to_string());
        let stem = key.stem();
        if stem.is_empty() {
            return Err(reject("file name has no stem"));
        }
        if stem.ends_with(CHUNK_DIR_SUFFIX) {
            return Err(reject("file name collides with chunk directory naming"));
        }
        Ok(key)
    }

    /// The raw file name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name with its archive extension stripped
    pub fn stem(&self) -> &str {
        match self.0.rfind('.') {
            Some(dot) => &self.0[..dot],
            None => &self.0,
        }
    }

    /// Archive format implied by the extension
    pub fn archive_type(&self) -> ArchiveType {
        ArchiveType::from_path(Path::new(&self.0)).unwrap_or(ArchiveType::Zip)
    }

    /// `<root>/<fileName>_chunks`
    pub fn chunk_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("{}{}", self.0, CHUNK_DIR_SUFFIX))
    }

    /// `<root>/<fileName>`
    pub fn archive_file(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }

    /// `<root>/<fileNameWithoutExtension>`
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(self.stem())
    }
}

impl std::fmt::Display for UploadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UploadKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// One chunk as received from a client
#[derive(Clone, Debug)]
pub struct ChunkUpload {
    /// Upload the chunk belongs to
    pub key: UploadKey,
    /// Zero-based position of the chunk
    pub index: u32,
    /// Total chunk count declared by the client
    pub total_chunks: u32,
    /// Chunk payload
    pub data: Vec<u8>,
}

/// Outcome of accepting one chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChunkAcceptResult {
    /// Chunk stored, upload still incomplete
    Accepted,
    /// Upload complete; another request is merging it right now
    AcceptedAndMerging,
    /// Upload merged, extracted and cleaned up
    AcceptedAndComplete,
}

/// Pipeline stage, used in failure events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Writing a chunk slot
    Store,
    /// Concatenating chunks
    Merge,
    /// Expanding the archive
    Extract,
    /// Removing intermediate state
    Cleanup,
}

/// Archive type detected by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// ZIP archive
    Zip,
}

impl ArchiveType {
    /// Detect the archive type from a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveType::Zip),
            _ => None,
        }
    }
}

/// Upload lifecycle events broadcast to subscribers
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A chunk was written to its slot
    ChunkReceived {
        /// Upload key
        key: String,
        /// Chunk index
        index: u32,
        /// Declared chunk count
        total_chunks: u32,
    },

    /// All chunks present, merge started
    Merging {
        /// Upload key
        key: String,
    },

    /// Merge finished, extraction started
    Extracting {
        /// Upload key
        key: String,
        /// Size of the merged archive in bytes
        archive_bytes: u64,
    },

    /// Upload extracted and intermediate state removed
    Completed {
        /// Upload key
        key: String,
        /// Extraction output directory
        #[schema(value_type = String)]
        output_dir: PathBuf,
        /// Number of files extracted
        files: usize,
        /// Completion time
        #[schema(value_type = String)]
        completed_at: DateTime<Utc>,
    },

    /// Merge or extraction failed; intermediate state retained for retry
    Failed {
        /// Upload key
        key: String,
        /// Stage that failed
        stage: Stage,
        /// Error message
        error: String,
    },

    /// Abandoned intermediate state removed by the retention sweeper
    SessionExpired {
        /// Removed path
        #[schema(value_type = String)]
        path: PathBuf,
    },
}
