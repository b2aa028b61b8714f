//! A paper translation request and its saga state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Saga state: `ocr → translation → {finished | failed}`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaperStatus {
    Ocr,
    Translation,
    Finished,
    Failed,
}

impl PaperStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaperStatus::Finished | PaperStatus::Failed)
    }
}

#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: String,

    /// Content hash of the uploaded source file.
    pub file_hash: String,

    pub create_at: DateTime<Utc>,

    pub status: PaperStatus,

    /// Where to send the translated text, if anywhere.
    pub email_to: Option<String>,

    pub target_language: String,

    /// Set once, on the success path only.
    pub result_text: Option<String>,
}

/// Input to `PaperService::create`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaper {
    pub file_hash: String,
    pub target_language: String,
    #[serde(default)]
    pub email_to: Option<String>,
}
