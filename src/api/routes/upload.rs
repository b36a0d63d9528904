//! Chunk upload handler.

use crate::api::AppState;
use crate::api::auth::check_upload_password;
use crate::error::{Error, Result, ToHttpStatus};
use crate::types::{ChunkAcceptResult, ChunkUpload, UploadKey};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Raw form fields, in whatever order the client sent them
#[derive(Default)]
struct UploadChunkForm {
    password: Option<String>,
    file_name: Option<String>,
    chunk_index: Option<String>,
    total_chunks: Option<String>,
    chunk: Option<Vec<u8>>,
}

impl UploadChunkForm {
    async fn read(multipart: &mut Multipart) -> Result<Self> {
        let malformed = |e: axum::extract::multipart::MultipartError| {
            Error::Validation(format!("malformed multipart body: {e}"))
        };

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "chunk" => form.chunk = Some(field.bytes().await.map_err(malformed)?.to_vec()),
                "password" => form.password = Some(field.text().await.map_err(malformed)?),
                "fileName" => form.file_name = Some(field.text().await.map_err(malformed)?),
                "chunkIndex" => form.chunk_index = Some(field.text().await.map_err(malformed)?),
                "totalChunks" => form.total_chunks = Some(field.text().await.map_err(malformed)?),
                _ => {}
            }
        }
        Ok(form)
    }

    fn into_chunk(self) -> Result<ChunkUpload> {
        let file_name = require(self.file_name, "fileName")?;
        let chunk_index = require(self.chunk_index, "chunkIndex")?;
        let total_chunks = require(self.total_chunks, "totalChunks")?;
        let data = require(self.chunk, "chunk")?;

        Ok(ChunkUpload {
            key: UploadKey::parse(&file_name)?,
            index: parse_count(&chunk_index, "chunkIndex")?,
            total_chunks: parse_count(&total_chunks, "totalChunks")?,
            data,
        })
    }
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Validation(format!("missing required field '{field}'")))
}

fn parse_count(raw: &str, field: &str) -> Result<u32> {
    raw.trim().parse().map_err(|_| {
        Error::Validation(format!(
            "field '{field}' must be a non-negative integer, got {raw:?}"
        ))
    })
}

/// POST /upload-chunk - Store one chunk of an archive upload
///
/// Answers as soon as the chunk is stored while the upload is incomplete. The
/// request that completes the upload is answered only after the archive is
/// merged and extracted.
#[utoipa::path(
    post,
    path = "/upload-chunk",
    tag = "upload",
    request_body(content = crate::api::routes::UploadChunkRequest, description = "One chunk of an archive upload", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "\"chunk accepted\" or \"upload complete\"", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing or malformed field", body = crate::error::ApiError),
        (status = 403, description = "Wrong upload password", body = crate::error::ApiError),
        (status = 500, description = "Chunk write, merge or extraction failed", body = crate::error::ApiError)
    )
)]
pub async fn upload_chunk(State(state): State<AppState>, mut multipart: Multipart) -> Result<Response> {
    let form = UploadChunkForm::read(&mut multipart).await?;

    // Password first: a rejected client learns nothing about its other fields
    check_upload_password(
        state.config.server.api.upload_password.as_deref(),
        form.password.as_deref(),
    )?;

    let upload = form.into_chunk()?;
    let key = upload.key.clone();
    let index = upload.index;

    match state.coordinator.accept_chunk(upload).await {
        Ok(ChunkAcceptResult::AcceptedAndComplete) => {
            Ok((StatusCode::OK, "upload complete").into_response())
        }
        Ok(ChunkAcceptResult::Accepted | ChunkAcceptResult::AcceptedAndMerging) => {
            Ok((StatusCode::OK, "chunk accepted").into_response())
        }
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(upload_key = %key, chunk_index = index, error = %e, "chunk upload failed");
            }
            Err(e)
        }
    }
}
