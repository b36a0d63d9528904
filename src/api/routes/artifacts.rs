//! Artifact handlers: playlist discovery and file serving.

use crate::api::AppState;
use crate::api::routes::PlaylistLinksResponse;
use crate::artifacts::ArtifactKind;
use crate::error::{Error, Result};
use crate::types::CHUNK_DIR_SUFFIX;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::path::Component;
use std::sync::Arc;

/// GET /get-m3u8-links - List links to every extracted playlist
#[utoipa::path(
    get,
    path = "/get-m3u8-links",
    tag = "artifacts",
    responses(
        (status = 200, description = "Links to all playlists under the upload root", body = crate::api::routes::PlaylistLinksResponse),
        (status = 500, description = "Upload root could not be scanned", body = crate::error::ApiError)
    )
)]
pub async fn list_playlist_links(State(state): State<AppState>) -> Result<Json<PlaylistLinksResponse>> {
    let locator = Arc::clone(&state.locator);

    let links = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
        Ok(locator.playlists()?.map(String::from).collect())
    })
    .await
    .map_err(|e| Error::Other(format!("playlist scan task failed: {e}")))?
    .inspect_err(|e| tracing::error!(error = %e, "failed to list playlists"))?;

    Ok(Json(PlaylistLinksResponse { links }))
}

/// GET /uploads/:folder/:file - Serve one extracted artifact
#[utoipa::path(
    get,
    path = "/uploads/{folder}/{file}",
    tag = "artifacts",
    params(
        ("folder" = String, Path, description = "Extraction output folder (archive name without extension)"),
        ("file" = String, Path, description = "File inside the folder, e.g. output.m3u8 or encryption.key")
    ),
    responses(
        (status = 200, description = "Artifact contents; Content-Type depends on the file kind", body = Vec<u8>),
        (status = 403, description = "Requesting origin is not allowed", body = crate::error::ApiError),
        (status = 404, description = "Artifact not found", body = crate::error::ApiError)
    )
)]
pub async fn serve_artifact(
    State(state): State<AppState>,
    Path((folder, file)): Path<(String, String)>,
) -> Result<Response> {
    let not_found = || Error::NotFound(format!("artifact {folder}/{file}"));

    // Chunk directories hold raw upload state, not artifacts
    if !is_plain_segment(&folder) || !is_plain_segment(&file) || folder.ends_with(CHUNK_DIR_SUFFIX)
    {
        return Err(not_found());
    }

    let path = state.config.upload_dir().join(&folder).join(&file);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(not_found()),
    }
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let kind = ArtifactKind::from_file_name(&file);
    tracing::debug!(?path, ?kind, bytes = bytes.len(), "serving artifact");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, kind.content_type())
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(header::CONTENT_DISPOSITION, "inline")
        .body(Body::from(bytes))
        .map_err(|e| Error::Other(e.to_string()))
}

/// A single, ordinary path component
fn is_plain_segment(segment: &str) -> bool {
    if segment.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = std::path::Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
