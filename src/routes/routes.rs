//! Defines the HTTP surface of the pipeline.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST /files/uploads`: start (or restart) a chunked upload
//!   - `POST /files/uploads/{hash}/chunks`: send one chunk (multipart)
//!   - `PUT  /files/uploads/{hash}/chunks/{index}`: mark a chunk stored elsewhere
//!   - `GET  /files/uploads/{hash}`: upload progress
//!   - `GET  /files/uploads/{hash}/url`: signed link to the merged file
//!
//! - **Stages**
//!   - `POST /ocr`, `GET /ocr/{task_id}`
//!   - `POST /translations`, `GET /translations/{task_id}`
//!   - `GET | DELETE /translations/permits`: semaphore usage and reset
//!
//! - **Papers**
//!   - `POST /papers`, `GET /papers`, `GET /papers/{id}`, `DELETE /papers/{id}`
//!
//! - **Blobs**
//!   - `GET /blobs/{bucket}/{*key}`: signed download
//!
//! The wildcard `*key` allows nested keys like `images/2025/page.jpg`.

use crate::{
    handlers::{
        blob_handlers::get_blob,
        health_handlers::{healthz, readyz},
        paper_handlers::{create_paper, delete_paper, get_paper, list_papers},
        task_handlers::{
            permit_usage, recognition_status, reset_permits, submit_recognition,
            submit_translation, translation_status,
        },
        upload_handlers::{file_url, mark_chunk, query_upload, start_upload, upload_chunk},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for every pipeline route.
///
/// Handlers extract the service they need from `AppState` via `FromRef`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Uploads
        .route("/files/uploads", post(start_upload))
        .route("/files/uploads/{hash}", get(query_upload))
        .route("/files/uploads/{hash}/url", get(file_url))
        .route("/files/uploads/{hash}/chunks", post(upload_chunk))
        .route("/files/uploads/{hash}/chunks/{index}", put(mark_chunk))
        // Stages
        .route("/ocr", post(submit_recognition))
        .route("/ocr/{task_id}", get(recognition_status))
        .route("/translations", post(submit_translation))
        .route(
            "/translations/permits",
            get(permit_usage).delete(reset_permits),
        )
        .route("/translations/{task_id}", get(translation_status))
        // Papers
        .route("/papers", post(create_paper).get(list_papers))
        .route("/papers/{id}", get(get_paper).delete(delete_paper))
        // Blobs
        .route("/blobs/{bucket}/{*key}", get(get_blob))
}
