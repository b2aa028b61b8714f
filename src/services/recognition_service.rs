//! Page-level text recognition.
//!
//! A document is rasterized into page images, every page is recognized
//! concurrently, and the page texts are stitched back together in page
//! order. Results are cached per source object.

use crate::{
    backends::{BlobStore, Rasterizer, Recognizer},
    config::PipelineSettings,
    coordination::TaskStatusStore,
    errors::{Error, Result},
    models::{recognition::RecognitionCacheEntry, task::TaskStatus},
    repository::RecognitionCacheRepository,
};
use axum::http::Method;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, future::join_all};
use std::{path::PathBuf, sync::Arc};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct RecognitionService {
    cache: Arc<dyn RecognitionCacheRepository>,
    blobs: Arc<dyn BlobStore>,
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    tasks: TaskStatusStore,
    settings: Arc<PipelineSettings>,
}

impl RecognitionService {
    pub fn new(
        cache: Arc<dyn RecognitionCacheRepository>,
        blobs: Arc<dyn BlobStore>,
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
        tasks: TaskStatusStore,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            cache,
            blobs,
            rasterizer,
            recognizer,
            tasks,
            settings,
        }
    }

    /// Start recognizing `bucket/object_key`. A cached result is returned as
    /// an already-finished task without doing any work.
    pub async fn submit(&self, bucket: &str, object_key: &str, file_type: &str) -> Result<String> {
        if bucket.is_empty() || object_key.is_empty() || file_type.is_empty() {
            return Err(Error::validation(
                "bucket, objectKey and fileType are required",
            ));
        }

        if let Some(hit) = self.cache.get(bucket, object_key, file_type).await? {
            debug!("recognition cache hit for {}/{}", bucket, object_key);
            return self.tasks.create_finished(&hit.text).await;
        }

        let task_id = self.tasks.create().await?;
        info!("recognition task {} for {}/{}", task_id, bucket, object_key);

        let service = self.clone();
        let (task, bucket, object_key, file_type) = (
            task_id.clone(),
            bucket.to_string(),
            object_key.to_string(),
            file_type.to_string(),
        );
        tokio::spawn(async move {
            service.run(&task, &bucket, &object_key, &file_type).await;
        });

        Ok(task_id)
    }

    pub async fn get_status(&self, task_id: &str) -> Result<TaskStatus> {
        self.tasks.get(task_id).await
    }

    async fn run(&self, task_id: &str, bucket: &str, object_key: &str, file_type: &str) {
        let text = match self.recognize_document(bucket, object_key, file_type).await {
            Ok(text) => text,
            Err(err) => {
                error!("recognition task {} failed: {}", task_id, err);
                String::new()
            }
        };

        if let Err(err) = self.tasks.finish(task_id, &text).await {
            error!("recording result of recognition task {}: {}", task_id, err);
        }
        if text.is_empty() {
            return;
        }

        let entry = RecognitionCacheEntry {
            id: task_id.to_string(),
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            file_type: file_type.to_string(),
            text,
            created_at: Utc::now(),
        };
        if let Err(err) = self.cache.put(&entry).await {
            warn!("caching recognition of {}/{}: {}", bucket, object_key, err);
        }
        info!("recognition task {} finished", task_id);
    }

    /// Download, rasterize, then recognize every page. Page texts are joined
    /// in page order; a page whose recognition fails contributes nothing.
    async fn recognize_document(
        &self,
        bucket: &str,
        object_key: &str,
        file_type: &str,
    ) -> Result<String> {
        let source = tempfile::Builder::new()
            .prefix("source-")
            .suffix(&format!(".{}", file_type))
            .tempfile()?;
        let mut file = fs::File::create(source.path()).await?;
        let mut body = self.blobs.get(bucket, object_key).await?;
        while let Some(piece) = body.next().await {
            file.write_all(&piece?).await?;
        }
        file.flush().await?;
        drop(file);

        let pages = self.rasterizer.rasterize(source.path()).await?;
        debug!(
            "{}/{} has {} pages in {}",
            bucket,
            object_key,
            pages.pages.len(),
            pages.dir().display()
        );

        let calls = pages.pages.iter().cloned().enumerate().map(|(index, page)| {
            let service = self.clone();
            let bucket = bucket.to_string();
            tokio::spawn(async move {
                service
                    .recognize_page(&bucket, page)
                    .await
                    .map_err(|err| (index, err))
            })
        });

        let mut slots = Vec::with_capacity(pages.pages.len());
        for outcome in join_all(calls).await {
            match outcome {
                Ok(Ok(text)) => slots.push(text),
                Ok(Err((index, err))) => {
                    warn!("page {} of {}/{} failed: {}", index, bucket, object_key, err);
                    slots.push(String::new());
                }
                Err(err) => {
                    warn!("page task of {}/{} aborted: {}", bucket, object_key, err);
                    slots.push(String::new());
                }
            }
        }

        Ok(slots.concat())
    }

    async fn recognize_page(&self, bucket: &str, page: PathBuf) -> Result<String> {
        let image = Bytes::from(fs::read(&page).await?);
        let key = format!("images/{}.jpg", Uuid::new_v4());
        self.blobs.put(bucket, &key, image).await?;
        let url = self
            .blobs
            .sign_url(bucket, &key, &Method::GET, self.settings.image_url_ttl)?;
        self.recognizer.recognize(&url).await
    }
}
