//! Error types for hls-drop
//!
//! This module provides the error taxonomy used throughout the crate:
//! - Request validation and authorization failures (never touch disk state)
//! - Storage failures from chunk writes, merges and extraction
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for hls-drop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hls-drop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "HLS_DROP_PORT")
        key: Option<String>,
    },

    /// A request field is missing or malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// The client-supplied file name cannot be used as an upload key
    #[error("invalid upload key {key:?}: {reason}")]
    InvalidUploadKey {
        /// The rejected file name
        key: String,
        /// Why the name was rejected
        reason: String,
    },

    /// Chunk index does not fall inside `[0, total)`
    #[error("chunk index {index} out of range for {total} chunks")]
    ChunkIndexOutOfRange {
        /// The offending index
        index: u32,
        /// The declared chunk count
        total: u32,
    },

    /// A chunk declared a different chunk count than the session was opened with
    #[error("upload {key} expects {expected} chunks, request declared {actual}")]
    TotalChunksMismatch {
        /// Upload key
        key: String,
        /// Chunk count fixed by the first chunk
        expected: u32,
        /// Chunk count declared by this request
        actual: u32,
    },

    /// Wrong shared secret or disallowed origin
    #[error("forbidden: {0}")]
    Auth(String),

    /// Requested artifact does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Chunk write, merge or extraction failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage errors raised by the chunk store, reassembler and extractor
#[derive(Debug, Error)]
pub enum StorageError {
    /// Chunk could not be persisted to its slot
    #[error("failed to write chunk {index} of {key}: {reason}")]
    ChunkWrite {
        /// Upload key
        key: String,
        /// Chunk index
        index: u32,
        /// Underlying failure
        reason: String,
    },

    /// A chunk expected by the merge is not on disk
    #[error("chunk {index} missing from {dir}")]
    MissingChunk {
        /// Session directory that was scanned
        dir: PathBuf,
        /// The missing chunk index
        index: u32,
    },

    /// Concatenating chunks into the archive failed
    #[error("failed to merge chunks into {archive}: {reason}")]
    MergeFailed {
        /// Destination archive path
        archive: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// An archive entry would resolve outside the output directory
    #[error("archive {archive} contains unsafe entry path {entry:?}")]
    UnsafeEntryPath {
        /// The archive holding the entry
        archive: PathBuf,
        /// Raw entry name as stored in the archive
        entry: String,
    },

    /// The archive format is not supported
    #[error("unsupported archive {archive}")]
    UnsupportedArchive {
        /// The archive path
        archive: PathBuf,
    },

    /// Removing intermediate state failed
    #[error("cleanup failed for {path}: {reason}")]
    CleanupFailed {
        /// Path that could not be removed
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Listing a directory failed
    #[error("failed to scan {path}: {reason}")]
    ScanFailed {
        /// Directory being scanned
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "chunk_index_out_of_range",
///     "message": "chunk index 7 out of range for 3 chunks",
///     "details": {
///       "chunk_index": 7,
///       "total_chunks": 3
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - user-correctable input
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,
            Error::InvalidUploadKey { .. } => 400,
            Error::ChunkIndexOutOfRange { .. } => 400,
            Error::TotalChunksMismatch { .. } => 400,

            // 403 Forbidden
            Error::Auth(_) => 403,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 500 Internal Server Error
            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::InvalidUploadKey { .. } => "invalid_upload_key",
            Error::ChunkIndexOutOfRange { .. } => "chunk_index_out_of_range",
            Error::TotalChunksMismatch { .. } => "total_chunks_mismatch",
            Error::Auth(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Storage(e) => match e {
                StorageError::ChunkWrite { .. } => "chunk_write_failed",
                StorageError::MissingChunk { .. } => "missing_chunk",
                StorageError::MergeFailed { .. } => "merge_failed",
                StorageError::ExtractionFailed { .. } => "extraction_failed",
                StorageError::UnsafeEntryPath { .. } => "unsafe_entry_path",
                StorageError::UnsupportedArchive { .. } => "unsupported_archive",
                StorageError::CleanupFailed { .. } => "cleanup_failed",
                StorageError::ScanFailed { .. } => "scan_failed",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::InvalidUploadKey { key, .. } => Some(serde_json::json!({
                "upload_key": key,
            })),
            Error::ChunkIndexOutOfRange { index, total } => Some(serde_json::json!({
                "chunk_index": index,
                "total_chunks": total,
            })),
            Error::TotalChunksMismatch {
                key,
                expected,
                actual,
            } => Some(serde_json::json!({
                "upload_key": key,
                "expected_total_chunks": expected,
                "declared_total_chunks": actual,
            })),
            Error::Storage(StorageError::ChunkWrite { key, index, .. }) => {
                Some(serde_json::json!({
                    "upload_key": key,
                    "chunk_index": index,
                }))
            }
            Error::Storage(StorageError::MissingChunk { index, .. }) => Some(serde_json::json!({
                "chunk_index": index,
            })),
            Error::Storage(StorageError::ExtractionFailed { archive, .. })
            | Error::Storage(StorageError::UnsupportedArchive { archive })
            | Error::Storage(StorageError::MergeFailed { archive, .. }) => {
                Some(serde_json::json!({
                    "archive": archive,
                }))
            }
            Error::Storage(StorageError::UnsafeEntryPath { archive, entry }) => {
                Some(serde_json::json!({
                    "archive": archive,
                    "entry": entry,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
