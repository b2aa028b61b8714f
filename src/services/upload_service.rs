//! Resumable chunked uploads.
//!
//! Chunk bookkeeping for one upload hash is serialised through a
//! [`DistLock`], so any number of service instances can accept chunks for
//! the same file. The call that moves the session into `Uploaded` merges the
//! chunks into the destination file. Later calls that find the session
//! `Uploaded` but the file missing or short merge it again.

use crate::{
    backends::BlobStore,
    config::PipelineSettings,
    coordination::{CoordinationStore, DistLock},
    errors::{Error, Result},
    models::upload::{StartUpload, UploadInfo, UploadSession},
    repository::UploadRepository,
};
use axum::http::Method;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct UploadService {
    repo: Arc<dyn UploadRepository>,
    blobs: Arc<dyn BlobStore>,
    coordination: Arc<dyn CoordinationStore>,
    settings: Arc<PipelineSettings>,
    default_bucket: String,
}

fn chunk_prefix(hash: &str) -> String {
    format!("chunks/{}/", hash)
}

fn chunk_key(hash: &str, index: i64) -> String {
    format!("{}{}", chunk_prefix(hash), index)
}

impl UploadService {
    pub fn new(
        repo: Arc<dyn UploadRepository>,
        blobs: Arc<dyn BlobStore>,
        coordination: Arc<dyn CoordinationStore>,
        settings: Arc<PipelineSettings>,
        default_bucket: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            blobs,
            coordination,
            settings,
            default_bucket: default_bucket.into(),
        }
    }

    /// Open a session in `Pending`. An existing session for the same hash is
    /// replaced.
    pub async fn start_upload(&self, req: StartUpload) -> Result<UploadInfo> {
        let bucket = req.bucket.unwrap_or_else(|| self.default_bucket.clone());
        if req.hash.trim().is_empty() {
            return Err(Error::validation("hash is required"));
        }
        if bucket.trim().is_empty() || req.file_path.trim().is_empty() {
            return Err(Error::validation("bucket and filePath are required"));
        }
        if req.chunk_nums < 1 || req.segment_size < 1 {
            return Err(Error::validation(
                "chunkNums and segmentSize must be positive",
            ));
        }

        let session = UploadSession::new(
            req.hash,
            req.chunk_nums,
            req.segment_size,
            bucket,
            req.file_path,
        );
        self.repo.create(&session).await?;
        info!(
            "started upload {} ({} chunks of {} bytes)",
            session.hash, session.chunk_nums, session.segment_size
        );
        Ok(UploadInfo::from(&session))
    }

    /// Record that chunk `index` arrived and return the refreshed session.
    /// The chunk's bytes must already be stored at `chunks/{hash}/{index}`.
    pub async fn mark_chunk_received(&self, hash: &str, index: i64) -> Result<UploadInfo> {
        self.accept(hash, index, false).await
    }

    /// Mark the chunk, then bring the destination file up to date once the
    /// session is `Uploaded`. `rewritten` forces a merge because the chunk's
    /// bytes were just replaced.
    async fn accept(&self, hash: &str, index: i64, rewritten: bool) -> Result<UploadInfo> {
        let (session, completed) = self.mark(hash, index).await?;
        if session.is_uploaded() {
            self.locked(
                format!("merge:{}", hash),
                self.assemble(&session, completed || rewritten),
            )
            .await?;
        }
        Ok(UploadInfo::from(&session))
    }

    /// Run `work` while holding the distributed lock `name`.
    async fn locked<T>(&self, name: String, work: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = DistLock::new(self.coordination.clone(), name, self.settings.lock_ttl)
            .with_retry(self.settings.lock_retry);
        lock.lock(self.settings.lock_wait).await?;

        let outcome = work.await;

        if let Err(err) = lock.unlock().await {
            warn!("failed to release lock {}: {}", lock.name(), err);
        }
        outcome
    }

    /// Lock-protected read-modify-write of the chunk set. The flag is set
    /// only for the call that moved the session into `Uploaded`.
    async fn mark(&self, hash: &str, index: i64) -> Result<(UploadSession, bool)> {
        if index < 0 {
            return Err(Error::validation("chunkIndex must not be negative"));
        }

        self.locked(format!("upload:{}", hash), self.record_chunk(hash, index))
            .await
    }

    async fn record_chunk(&self, hash: &str, index: i64) -> Result<(UploadSession, bool)> {
        let mut session = self.load(hash).await?;
        if index >= session.chunk_nums {
            return Err(Error::validation(format!(
                "chunkIndex {} out of range for {} chunks",
                index, session.chunk_nums
            )));
        }

        let completed = session.record_chunk(index);
        self.repo
            .update_progress(
                hash,
                &session.chunks,
                session.status,
                session.current_index,
            )
            .await?;
        debug!(
            "upload {} chunk {} recorded, contiguous through {}",
            hash, index, session.current_index
        );
        Ok((session, completed))
    }

    /// Read-only snapshot. Not locked, so it may trail an in-flight mark.
    pub async fn query(&self, hash: &str) -> Result<UploadInfo> {
        Ok(UploadInfo::from(&self.load(hash).await?))
    }

    /// Store a chunk's bytes and mark it received.
    pub async fn receive_chunk(&self, hash: &str, index: i64, data: Bytes) -> Result<UploadInfo> {
        if index < 0 {
            return Err(Error::validation("chunkIndex must not be negative"));
        }
        let session = self.load(hash).await?;
        if index >= session.chunk_nums {
            return Err(Error::validation(format!(
                "chunkIndex {} out of range for {} chunks",
                index, session.chunk_nums
            )));
        }

        self.blobs
            .put(&session.bucket, &chunk_key(hash, index), data)
            .await?;

        self.accept(hash, index, true).await
    }

    /// Merge and back up an `Uploaded` session. Without `force`, an existing
    /// file whose length matches the stored chunks is left alone.
    async fn assemble(&self, session: &UploadSession, force: bool) -> Result<()> {
        if !force {
            let merged = self.blobs.size(&session.bucket, &session.file_path).await?;
            if merged.is_some() && merged == self.stored_len(session).await? {
                return Ok(());
            }
            warn!(
                "upload {} is uploaded but {}/{} is stale, merging again",
                session.hash, session.bucket, session.file_path
            );
        }
        self.merge(session).await?;
        self.spawn_backup(session);
        Ok(())
    }

    /// Total length of the stored chunks, or `None` while any is missing.
    async fn stored_len(&self, session: &UploadSession) -> Result<Option<u64>> {
        let mut total = 0;
        for index in 0..session.chunk_nums {
            match self
                .blobs
                .size(&session.bucket, &chunk_key(&session.hash, index))
                .await?
            {
                Some(len) => total += len,
                None => return Ok(None),
            }
        }
        Ok(Some(total))
    }

    /// Concatenate the stored chunks, in index order, into the file path.
    async fn merge(&self, session: &UploadSession) -> Result<()> {
        let prefix = chunk_prefix(&session.hash);
        let mut indices: Vec<i64> = self
            .blobs
            .list(&session.bucket, &prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix)?.parse().ok())
            .filter(|index| (0..session.chunk_nums).contains(index))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.len() as i64 != session.chunk_nums {
            return Err(Error::validation(format!(
                "upload {} has {} of {} chunks stored",
                session.hash,
                indices.len(),
                session.chunk_nums
            )));
        }

        let mut offset = 0;
        for index in indices {
            let mut chunk = self
                .blobs
                .get(&session.bucket, &chunk_key(&session.hash, index))
                .await?;
            while let Some(piece) = chunk.next().await {
                offset = self
                    .blobs
                    .append(&session.bucket, &session.file_path, piece?, offset)
                    .await?;
            }
        }
        info!(
            "merged upload {} into {}/{} ({} bytes)",
            session.hash, session.bucket, session.file_path, offset
        );
        Ok(())
    }

    fn spawn_backup(&self, session: &UploadSession) {
        let blobs = self.blobs.clone();
        let bucket = session.bucket.clone();
        let src = session.file_path.clone();
        let dst = format!("{}{}", self.settings.backup_prefix, session.file_path);
        tokio::spawn(async move {
            match blobs.copy(&bucket, &src, &dst).await {
                Ok(()) => debug!("backed up {}/{} to {}", bucket, src, dst),
                Err(err) => error!("backup of {}/{} failed: {}", bucket, src, err),
            }
        });
    }

    /// Signed GET URL for the merged file.
    pub async fn file_url(&self, hash: &str) -> Result<String> {
        let session = self.load(hash).await?;
        if !session.is_uploaded() {
            return Err(Error::UploadIncomplete(hash.to_string()));
        }
        self.blobs.sign_url(
            &session.bucket,
            &session.file_path,
            &Method::GET,
            self.settings.file_url_ttl,
        )
    }

    async fn load(&self, hash: &str) -> Result<UploadSession> {
        self.repo
            .get(hash)
            .await?
            .ok_or_else(|| Error::not_found(format!("upload `{}`", hash)))
    }
}
