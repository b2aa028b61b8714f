//! Submit/poll handlers for the recognition and translation stages.

use crate::{
    errors::AppError,
    models::task::{TaskId, TaskStatus},
    services::{RecognitionService, TranslationService},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionRequest {
    pub bucket: String,
    pub object_key: String,
    #[serde(default = "default_file_type")]
    pub file_type: String,
}

fn default_file_type() -> String {
    "pdf".into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub text: String,
    pub target_language: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitUsage {
    pub in_use: i64,
}

/// `POST /ocr`
pub async fn submit_recognition(
    State(recognition): State<RecognitionService>,
    Json(req): Json<RecognitionRequest>,
) -> Result<(StatusCode, Json<TaskId>), AppError> {
    let task_id = recognition
        .submit(&req.bucket, &req.object_key, &req.file_type)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskId { task_id })))
}

/// `GET /ocr/{task_id}`
pub async fn recognition_status(
    State(recognition): State<RecognitionService>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>, AppError> {
    Ok(Json(recognition.get_status(&task_id).await?))
}

/// `POST /translations`
pub async fn submit_translation(
    State(translation): State<TranslationService>,
    Json(req): Json<TranslationRequest>,
) -> Result<(StatusCode, Json<TaskId>), AppError> {
    let task_id = translation
        .submit(&req.text, &req.target_language)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(TaskId { task_id })))
}

/// `GET /translations/{task_id}`
pub async fn translation_status(
    State(translation): State<TranslationService>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>, AppError> {
    Ok(Json(translation.get_status(&task_id).await?))
}

/// `GET /translations/permits`
pub async fn permit_usage(
    State(translation): State<TranslationService>,
) -> Result<Json<PermitUsage>, AppError> {
    let in_use = translation.permits_in_use().await?;
    Ok(Json(PermitUsage { in_use }))
}

/// `DELETE /translations/permits`: forget leaked permits.
pub async fn reset_permits(
    State(translation): State<TranslationService>,
) -> Result<StatusCode, AppError> {
    translation.reset_permits().await?;
    Ok(StatusCode::NO_CONTENT)
}
