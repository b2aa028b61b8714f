//! Resumable chunked-upload sessions and their chunk records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of an upload session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Uploaded,
}

/// A single received chunk.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub index: i64,
    pub ok: bool,
}

/// A chunked upload, identified by the content hash of the whole file.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadSession {
    pub hash: String,

    pub status: UploadStatus,

    /// Total number of chunks expected.
    pub chunk_nums: i64,

    /// End of the contiguous run of received chunks starting at 0, or -1.
    pub current_index: i64,

    pub segment_size: i64,

    /// Destination of the merged file.
    pub bucket: String,
    pub file_path: String,

    #[sqlx(json)]
    pub chunks: Vec<Chunk>,

    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        hash: impl Into<String>,
        chunk_nums: i64,
        segment_size: i64,
        bucket: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            status: UploadStatus::Pending,
            chunk_nums,
            current_index: -1,
            segment_size,
            bucket: bucket.into(),
            file_path: file_path.into(),
            chunks: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == UploadStatus::Uploaded
    }

    /// Record `index` as received and recompute the derived fields.
    ///
    /// Returns `true` when this call moved the session into `Uploaded`.
    pub fn record_chunk(&mut self, index: i64) -> bool {
        let was_uploaded = self.is_uploaded();
        if self.status == UploadStatus::Pending {
            self.status = UploadStatus::Uploading;
        }

        match self.chunks.iter_mut().find(|c| c.index == index) {
            Some(existing) => existing.ok = true,
            None => self.chunks.push(Chunk { index, ok: true }),
        }
        self.chunks.sort_by_key(|c| c.index);

        self.current_index = contiguous_end(&self.chunks);
        if self.current_index >= self.chunk_nums - 1 {
            self.status = UploadStatus::Uploaded;
        }

        !was_uploaded && self.is_uploaded()
    }
}

/// Largest `i` such that chunks `0..=i` are all present and OK, or -1.
pub fn contiguous_end(chunks: &[Chunk]) -> i64 {
    let mut sorted: Vec<i64> = chunks.iter().filter(|c| c.ok).map(|c| c.index).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut last = -1;
    for index in sorted {
        if index == last + 1 {
            last = index;
        } else if index > last + 1 {
            break;
        }
    }
    last
}

/// Input to `UploadService::start_upload`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartUpload {
    pub hash: String,
    pub chunk_nums: i64,
    pub segment_size: i64,
    /// Defaults to the service's configured bucket.
    #[serde(default)]
    pub bucket: Option<String>,
    pub file_path: String,
}

/// Caller-facing view of a session. Destination is only revealed once the
/// merged file exists.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub hash: String,
    pub status: UploadStatus,
    pub chunk_nums: i64,
    pub current_index: i64,
    pub segment_size: i64,
    pub bucket: Option<String>,
    pub file_path: Option<String>,
}

impl From<&UploadSession> for UploadInfo {
    fn from(session: &UploadSession) -> Self {
        let uploaded = session.is_uploaded();
        Self {
            hash: session.hash.clone(),
            status: session.status,
            chunk_nums: session.chunk_nums,
            current_index: session.current_index,
            segment_size: session.segment_size,
            bucket: uploaded.then(|| session.bucket.clone()),
            file_path: uploaded.then(|| session.file_path.clone()),
        }
    }
}
