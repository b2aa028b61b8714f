//! HTTP handlers for chunked uploads.

use crate::{
    errors::AppError,
    models::upload::{StartUpload, UploadInfo},
    services::UploadService,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use bytes::Bytes;
use serde::Serialize;

#[derive(Serialize)]
pub struct FileUrl {
    pub url: String,
}

/// `POST /files/uploads`: open (or restart) a session.
pub async fn start_upload(
    State(uploads): State<UploadService>,
    Json(req): Json<StartUpload>,
) -> Result<(StatusCode, Json<UploadInfo>), AppError> {
    let info = uploads.start_upload(req).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// `POST /files/uploads/{hash}/chunks`: multipart with `chunkIndex` and
/// `chunk` fields.
pub async fn upload_chunk(
    State(uploads): State<UploadService>,
    Path(hash): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadInfo>, AppError> {
    let mut index: Option<i64> = None;
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read multipart field: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "chunkIndex" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("failed to read chunkIndex: {}", e)))?;
                let parsed = text
                    .trim()
                    .parse()
                    .map_err(|_| AppError::bad_request(format!("chunkIndex `{}` is not a number", text)))?;
                index = Some(parsed);
            }
            "chunk" => {
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::bad_request(format!("failed to read chunk: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let (Some(index), Some(data)) = (index, data) else {
        return Err(AppError::bad_request("chunkIndex and chunk are required"));
    };
    let info = uploads.receive_chunk(&hash, index, data).await?;
    Ok(Json(info))
}

/// `PUT /files/uploads/{hash}/chunks/{index}`: mark a chunk that was
/// written to the blob store directly.
pub async fn mark_chunk(
    State(uploads): State<UploadService>,
    Path((hash, index)): Path<(String, i64)>,
) -> Result<Json<UploadInfo>, AppError> {
    Ok(Json(uploads.mark_chunk_received(&hash, index).await?))
}

/// `GET /files/uploads/{hash}`
pub async fn query_upload(
    State(uploads): State<UploadService>,
    Path(hash): Path<String>,
) -> Result<Json<UploadInfo>, AppError> {
    Ok(Json(uploads.query(&hash).await?))
}

/// `GET /files/uploads/{hash}/url`: signed link to the merged file.
pub async fn file_url(
    State(uploads): State<UploadService>,
    Path(hash): Path<String>,
) -> Result<Json<FileUrl>, AppError> {
    let url = uploads.file_url(&hash).await?;
    Ok(Json(FileUrl { url }))
}
