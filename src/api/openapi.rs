//! OpenAPI documentation and schema generation
//!
//! This module defines the OpenAPI specification for the hls-drop REST API
//! using utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the hls-drop REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "hls-drop REST API",
        version = "0.1.0",
        description = "Chunked archive upload with server-side reassembly and extraction, and serving of the extracted HLS playlists and keys",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:3001", description = "Local development server")
    ),
    paths(
        // Upload
        crate::api::routes::upload_chunk,

        // Artifacts
        crate::api::routes::list_playlist_links,
        crate::api::routes::serve_artifact,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::Event,
        crate::types::Stage,
        crate::types::ChunkAcceptResult,
        crate::types::ArchiveType,
        crate::artifacts::ArtifactKind,

        // Config types from config.rs
        crate::config::Config,
        crate::config::StorageConfig,
        crate::config::UploadConfig,
        crate::config::RetentionConfig,
        crate::config::ServerIntegrationConfig,
        crate::config::ApiConfig,

        // API request/response types from routes
        crate::api::routes::UploadChunkRequest,
        crate::api::routes::PlaylistLinksResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "upload", description = "Chunked archive upload"),
        (name = "artifacts", description = "Playlist discovery and extracted artifact serving"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
