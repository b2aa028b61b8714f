//! Serves blobs behind signed URLs, so the recognizer (and browsers) can
//! fetch page images and merged files without credentials.

use crate::{errors::AppError, models::blob::BlobObject, services::LocalBlobStore};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

/// Query string appended by `LocalBlobStore::sign_url`.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub method: String,
    pub expires: i64,
    pub signature: String,
}

/// `GET /blobs/{bucket}/{*key}`: stream the object if the signature holds.
pub async fn get_blob(
    State(blobs): State<LocalBlobStore>,
    Path((bucket, key)): Path<(String, String)>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    if !q.method.eq_ignore_ascii_case(Method::GET.as_str())
        || !blobs.verify_signature(Method::GET.as_str(), &bucket, &key, q.expires, &q.signature)
    {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "signature invalid or expired",
        ));
    }

    let (meta, file) = blobs.open_reader(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &meta);
    Ok(response)
}

fn content_type(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn set_blob_headers(headers: &mut HeaderMap, meta: &BlobObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(&meta.key)),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref() {
        let quoted = format!("\"{}\"", etag);
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
