//! Durable records: upload sessions, papers and the recognition cache.

use crate::{
    errors::Result,
    models::{
        paper::{Paper, PaperStatus},
        recognition::RecognitionCacheEntry,
        upload::{Chunk, UploadSession, UploadStatus},
    },
};
use async_trait::async_trait;

pub mod sqlite;

pub use sqlite::{SqlitePaperRepository, SqliteRecognitionCache, SqliteUploadRepository};

#[async_trait]
pub trait UploadRepository: Send + Sync {
    /// Insert a session, replacing any earlier session with the same hash.
    async fn create(&self, session: &UploadSession) -> Result<()>;

    async fn get(&self, hash: &str) -> Result<Option<UploadSession>>;

    /// Persist the fields `MarkChunkReceived` recomputes.
    async fn update_progress(
        &self,
        hash: &str,
        chunks: &[Chunk],
        status: UploadStatus,
        current_index: i64,
    ) -> Result<()>;
}

#[async_trait]
pub trait PaperRepository: Send + Sync {
    async fn create(&self, paper: &Paper) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Paper>>;

    /// All papers, newest first.
    async fn list(&self) -> Result<Vec<Paper>>;

    async fn set_status(&self, id: &str, status: PaperStatus) -> Result<()>;

    /// Store the result text and mark the paper finished in one write.
    async fn complete(&self, id: &str, result_text: &str) -> Result<()>;

    /// Returns whether a paper was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait RecognitionCacheRepository: Send + Sync {
    async fn get(
        &self,
        bucket: &str,
        object_key: &str,
        file_type: &str,
    ) -> Result<Option<RecognitionCacheEntry>>;

    /// Store an entry. An existing entry for the same key is kept.
    async fn put(&self, entry: &RecognitionCacheEntry) -> Result<()>;
}
