use crate::{
    errors::AppError,
    models::paper::{CreatePaper, Paper},
    services::PaperService,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct PaperList {
    pub total: usize,
    pub papers: Vec<Paper>,
}

/// `POST /papers`: returns as soon as the saga is started.
pub async fn create_paper(
    State(papers): State<PaperService>,
    Json(req): Json<CreatePaper>,
) -> Result<(StatusCode, Json<Paper>), AppError> {
    let paper = papers.create(req).await?;
    Ok((StatusCode::ACCEPTED, Json(paper)))
}

pub async fn list_papers(State(papers): State<PaperService>) -> Result<Json<PaperList>, AppError> {
    let papers = papers.list().await?;
    Ok(Json(PaperList {
        total: papers.len(),
        papers,
    }))
}

pub async fn get_paper(
    State(papers): State<PaperService>,
    Path(id): Path<String>,
) -> Result<Json<Paper>, AppError> {
    Ok(Json(papers.get(&id).await?))
}

pub async fn delete_paper(
    State(papers): State<PaperService>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    papers.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
