use super::{PaperRepository, RecognitionCacheRepository, UploadRepository};
use crate::{
    errors::Result,
    models::{
        paper::{Paper, PaperStatus},
        recognition::RecognitionCacheEntry,
        upload::{Chunk, UploadSession, UploadStatus},
    },
};
use async_trait::async_trait;
use sqlx::{SqlitePool, types::Json};

#[derive(Clone)]
pub struct SqliteUploadRepository {
    db: SqlitePool,
}

impl SqliteUploadRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UploadRepository for SqliteUploadRepository {
    async fn create(&self, session: &UploadSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (
                hash, status, chunk_nums, current_index, segment_size,
                bucket, file_path, chunks, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                status = excluded.status,
                chunk_nums = excluded.chunk_nums,
                current_index = excluded.current_index,
                segment_size = excluded.segment_size,
                bucket = excluded.bucket,
                file_path = excluded.file_path,
                chunks = excluded.chunks,
                created_at = excluded.created_at
            "#,
        )
        .bind(&session.hash)
        .bind(session.status)
        .bind(session.chunk_nums)
        .bind(session.current_index)
        .bind(session.segment_size)
        .bind(&session.bucket)
        .bind(&session.file_path)
        .bind(Json(&session.chunks))
        .bind(session.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<UploadSession>> {
        let session = sqlx::query_as::<_, UploadSession>(
            "SELECT hash, status, chunk_nums, current_index, segment_size,
                    bucket, file_path, chunks, created_at
             FROM uploads WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(session)
    }

    async fn update_progress(
        &self,
        hash: &str,
        chunks: &[Chunk],
        status: UploadStatus,
        current_index: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE uploads SET chunks = ?, status = ?, current_index = ? WHERE hash = ?",
        )
        .bind(Json(chunks))
        .bind(status)
        .bind(current_index)
        .bind(hash)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqlitePaperRepository {
    db: SqlitePool,
}

impl SqlitePaperRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

const PAPER_COLUMNS: &str =
    "id, file_hash, create_at, status, email_to, target_language, result_text";

#[async_trait]
impl PaperRepository for SqlitePaperRepository {
    async fn create(&self, paper: &Paper) -> Result<()> {
        sqlx::query(
            "INSERT INTO papers (id, file_hash, create_at, status, email_to, target_language, result_text)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&paper.id)
        .bind(&paper.file_hash)
        .bind(paper.create_at)
        .bind(paper.status)
        .bind(&paper.email_to)
        .bind(&paper.target_language)
        .bind(&paper.result_text)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Paper>> {
        let paper = sqlx::query_as::<_, Paper>(&format!(
            "SELECT {} FROM papers WHERE id = ?",
            PAPER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(paper)
    }

    async fn list(&self) -> Result<Vec<Paper>> {
        let papers = sqlx::query_as::<_, Paper>(&format!(
            "SELECT {} FROM papers ORDER BY create_at DESC",
            PAPER_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(papers)
    }

    async fn set_status(&self, id: &str, status: PaperStatus) -> Result<()> {
        sqlx::query("UPDATE papers SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn complete(&self, id: &str, result_text: &str) -> Result<()> {
        sqlx::query("UPDATE papers SET result_text = ?, status = ? WHERE id = ?")
            .bind(result_text)
            .bind(PaperStatus::Finished)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM papers WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct SqliteRecognitionCache {
    db: SqlitePool,
}

impl SqliteRecognitionCache {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecognitionCacheRepository for SqliteRecognitionCache {
    async fn get(
        &self,
        bucket: &str,
        object_key: &str,
        file_type: &str,
    ) -> Result<Option<RecognitionCacheEntry>> {
        let entry = sqlx::query_as::<_, RecognitionCacheEntry>(
            "SELECT id, bucket, object_key, file_type, text, created_at
             FROM ocr_cache WHERE bucket = ? AND object_key = ? AND file_type = ?",
        )
        .bind(bucket)
        .bind(object_key)
        .bind(file_type)
        .fetch_optional(&self.db)
        .await?;
        Ok(entry)
    }

    async fn put(&self, entry: &RecognitionCacheEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO ocr_cache (id, bucket, object_key, file_type, text, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(bucket, object_key, file_type) DO NOTHING",
        )
        .bind(&entry.id)
        .bind(&entry.bucket)
        .bind(&entry.object_key)
        .bind(&entry.file_type)
        .bind(&entry.text)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}
