//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - `upload` - Chunk intake
//! - `artifacts` - Playlist discovery and artifact serving
//! - `system` - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod artifacts;
mod system;
mod upload;

// Re-export all handlers so `routes::function_name` continues to work
pub use artifacts::*;
pub use system::*;
pub use upload::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Multipart form of POST /upload-chunk (documentation only; the handler
/// reads fields one by one so it can reject bad passwords before parsing)
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    /// Shared upload password
    pub password: String,
    /// Archive file name, identifies the upload (e.g. `video.zip`)
    pub file_name: String,
    /// Zero-based index of this chunk
    pub chunk_index: u32,
    /// Total number of chunks in the upload
    pub total_chunks: u32,
    /// Chunk bytes
    #[schema(value_type = String, format = Binary)]
    pub chunk: Vec<u8>,
}

/// Response for GET /get-m3u8-links
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct PlaylistLinksResponse {
    /// Absolute URLs of every playlist under the upload root
    pub links: Vec<String>,
}
