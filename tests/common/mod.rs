#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use futures::{StreamExt, stream};
use paper_pipeline::{
    backends::{
        BlobStore, ByteStream, ChatBackend, Notifier, RasterizedPages, Rasterizer, Recognizer,
        TextStream,
    },
    config::PipelineSettings,
    coordination::{CoordinationStore, SqliteCoordinationStore, TaskStatusStore},
    db,
    errors::{Error, Result},
    models::{
        paper::Paper,
        task::TaskStatus,
        upload::{Chunk, UploadSession, UploadStatus},
    },
    repository::{
        SqlitePaperRepository, SqliteRecognitionCache, SqliteUploadRepository, UploadRepository,
    },
    services::{PaperService, RecognitionService, TranslationService, UploadService},
};
use sqlx::SqlitePool;
use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::time::{Instant, sleep};

pub const BUCKET: &str = "papers";

/// A migrated SQLite database in a private temp directory. Keep the
/// `TempDir` alive for as long as the pool is used.
pub async fn test_db() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("pipeline.db").display());
    let pool = db::connect(&url, 8).await.unwrap();
    db::migrate(&pool).await.unwrap();
    (dir, pool)
}

/// Production constants with every wait shrunk to test scale.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        lock_retry: Duration::from_millis(1),
        lock_wait: Duration::from_secs(10),
        semaphore_poll: Duration::from_millis(10),
        semaphore_wait: Duration::from_secs(5),
        status_poll: Duration::from_millis(20),
        ..PipelineSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

/// In-memory blob store. Signed URLs are `mem://{bucket}/{key}` and can be
/// resolved back with [`MemoryBlobStore::resolve`].
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn read(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn resolve(&self, url: &str) -> Option<Vec<u8>> {
        let (bucket, key) = url.strip_prefix("mem://")?.split_once('/')?;
        self.read(bucket, key)
    }

    pub fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.insert(bucket, key, &data);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let data = self
            .read(bucket, key)
            .ok_or_else(|| Error::not_found(format!("object `{}/{}`", bucket, key)))?;
        // hand the payload out in small pieces, like a network body
        let pieces: Vec<std::io::Result<Bytes>> = data
            .chunks(2)
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        Ok(stream::iter(pieces).boxed())
    }

    async fn size(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        Ok(self.read(bucket, key).map(|data| data.len() as u64))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self.keys(bucket, prefix))
    }

    fn sign_url(&self, bucket: &str, key: &str, _method: &Method, _ttl: Duration) -> Result<String> {
        Ok(format!("mem://{}/{}", bucket, key))
    }

    async fn append(&self, bucket: &str, key: &str, data: Bytes, offset: u64) -> Result<u64> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .entry((bucket.to_string(), key.to_string()))
            .or_default();
        if offset == 0 {
            object.clear();
        } else if object.len() as u64 != offset {
            return Err(Error::validation(format!(
                "append at {} but length is {}",
                offset,
                object.len()
            )));
        }
        object.extend_from_slice(&data);
        Ok(object.len() as u64)
    }

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        let data = self
            .read(bucket, src_key)
            .ok_or_else(|| Error::not_found(format!("object `{}/{}`", bucket, src_key)))?;
        self.insert(bucket, dst_key, &data);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rasterizer + recognizer
// ---------------------------------------------------------------------------

/// Writes one "image" per configured page; each image's bytes are the
/// page's text.
pub struct FakeRasterizer {
    pages: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeRasterizer {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, document: &Path) -> Result<RasterizedPages> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(document.exists(), "source document was not downloaded");
        let dir = tempfile::tempdir()?;
        let mut paths = Vec::new();
        for (index, text) in self.pages.iter().enumerate() {
            let path = dir.path().join(format!("page-{}.jpg", index));
            tokio::fs::write(&path, text.as_bytes()).await?;
            paths.push(path);
        }
        Ok(RasterizedPages::new(paths, dir))
    }
}

/// "Recognizes" an image by reading its bytes back through the signed URL.
pub struct FakeRecognizer {
    blobs: Arc<MemoryBlobStore>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    pub calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn new(blobs: Arc<MemoryBlobStore>) -> Self {
        Self {
            blobs,
            failing: HashSet::new(),
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Pages whose text is `page` fail.
    pub fn failing(mut self, page: &str) -> Self {
        self.failing.insert(page.to_string());
        self
    }

    pub fn delayed(mut self, page: &str, delay: Duration) -> Self {
        self.delays.insert(page.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn recognize(&self, image_url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .blobs
            .resolve(image_url)
            .ok_or_else(|| Error::upstream("recognizer", format!("cannot fetch {}", image_url)))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(delay) = self.delays.get(&text) {
            sleep(*delay).await;
        }
        if self.failing.contains(&text) {
            return Err(Error::upstream("recognizer", "simulated page failure"));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Chat + notifier
// ---------------------------------------------------------------------------

/// Streams each segment back word by word, recording prompts and the peak
/// number of overlapping calls.
#[derive(Default)]
pub struct EchoChat {
    pub delay: Duration,
    pub fail: bool,
    pub prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl EchoChat {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for EchoChat {
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let segment = prompt
            .split_once('\n')
            .map(|(_, segment)| segment)
            .unwrap_or_default();
        let mut fragments: Vec<Result<String>> = segment
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        if self.fail {
            fragments.truncate(1);
            fragments.push(Err(Error::upstream("chat", "connection reset")));
        }
        Ok(stream::iter(fragments).boxed())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        if self.fail {
            return Err(Error::upstream("notifier", "mailbox unavailable"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Upload repository with a widened read-modify-write window
// ---------------------------------------------------------------------------

/// Sleeps between reading a session and handing it back, so unsynchronised
/// writers would overwrite each other's chunk lists.
pub struct SlowUploadRepository {
    inner: SqliteUploadRepository,
    delay: Duration,
}

impl SlowUploadRepository {
    pub fn new(db: SqlitePool, delay: Duration) -> Self {
        Self {
            inner: SqliteUploadRepository::new(db),
            delay,
        }
    }
}

#[async_trait]
impl UploadRepository for SlowUploadRepository {
    async fn create(&self, session: &UploadSession) -> Result<()> {
        self.inner.create(session).await
    }

    async fn get(&self, hash: &str) -> Result<Option<UploadSession>> {
        let session = self.inner.get(hash).await?;
        sleep(self.delay).await;
        Ok(session)
    }

    async fn update_progress(
        &self,
        hash: &str,
        chunks: &[Chunk],
        status: UploadStatus,
        current_index: i64,
    ) -> Result<()> {
        self.inner
            .update_progress(hash, chunks, status, current_index)
            .await
    }
}

// ---------------------------------------------------------------------------
// Full wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub db: SqlitePool,
    pub settings: Arc<PipelineSettings>,
    pub coordination: Arc<dyn CoordinationStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub rasterizer: Arc<FakeRasterizer>,
    pub recognizer: Arc<FakeRecognizer>,
    pub chat: Arc<EchoChat>,
    pub notifier: Arc<RecordingNotifier>,
    pub uploads: UploadService,
    pub recognition: RecognitionService,
    pub translation: TranslationService,
    pub papers: PaperService,
}

/// What to plug into a [`Harness`]. Unset parts get sensible fakes.
pub struct HarnessBuilder {
    pub settings: PipelineSettings,
    pub pages: Vec<&'static str>,
    pub recognizer: Option<Box<dyn FnOnce(Arc<MemoryBlobStore>) -> FakeRecognizer>>,
    pub chat: EchoChat,
    pub notifier: RecordingNotifier,
    pub upload_delay: Option<Duration>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            settings: fast_settings(),
            pages: vec!["Hello world. ", "Second page."],
            recognizer: None,
            chat: EchoChat::default(),
            notifier: RecordingNotifier::default(),
            upload_delay: None,
        }
    }
}

impl HarnessBuilder {
    pub fn pages(mut self, pages: &[&'static str]) -> Self {
        self.pages = pages.to_vec();
        self
    }

    pub fn recognizer(
        mut self,
        build: impl FnOnce(Arc<MemoryBlobStore>) -> FakeRecognizer + 'static,
    ) -> Self {
        self.recognizer = Some(Box::new(build));
        self
    }

    pub fn chat(mut self, chat: EchoChat) -> Self {
        self.chat = chat;
        self
    }

    pub fn notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(mut self, edit: impl FnOnce(&mut PipelineSettings)) -> Self {
        edit(&mut self.settings);
        self
    }

    pub fn upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    pub async fn build(self) -> Harness {
        let (dir, db) = test_db().await;
        let settings = Arc::new(self.settings);
        let coordination: Arc<dyn CoordinationStore> =
            Arc::new(SqliteCoordinationStore::new(db.clone()));
        let blobs = Arc::new(MemoryBlobStore::default());
        let rasterizer = Arc::new(FakeRasterizer::new(&self.pages));
        let recognizer = Arc::new(match self.recognizer {
            Some(build) => build(blobs.clone()),
            None => FakeRecognizer::new(blobs.clone()),
        });
        let chat = Arc::new(self.chat);
        let notifier = Arc::new(self.notifier);

        let upload_repo: Arc<dyn UploadRepository> = match self.upload_delay {
            Some(delay) => Arc::new(SlowUploadRepository::new(db.clone(), delay)),
            None => Arc::new(SqliteUploadRepository::new(db.clone())),
        };
        let uploads = UploadService::new(
            upload_repo,
            blobs.clone(),
            coordination.clone(),
            settings.clone(),
            BUCKET,
        );
        let recognition = RecognitionService::new(
            Arc::new(SqliteRecognitionCache::new(db.clone())),
            blobs.clone(),
            rasterizer.clone(),
            recognizer.clone(),
            TaskStatusStore::new(coordination.clone(), "ocr", settings.task_ttl),
            settings.clone(),
        );
        let translation = TranslationService::new(
            chat.clone(),
            coordination.clone(),
            TaskStatusStore::new(coordination.clone(), "translation", settings.task_ttl),
            settings.clone(),
        );
        let papers = PaperService::new(
            Arc::new(SqlitePaperRepository::new(db.clone())),
            uploads.clone(),
            recognition.clone(),
            translation.clone(),
            notifier.clone(),
            settings.clone(),
        );

        Harness {
            dir,
            db,
            settings,
            coordination,
            blobs,
            rasterizer,
            recognizer,
            chat,
            notifier,
            uploads,
            recognition,
            translation,
            papers,
        }
    }
}

impl Harness {
    pub async fn new() -> Self {
        HarnessBuilder::default().build().await
    }
}

// ---------------------------------------------------------------------------
// Waiting helpers
// ---------------------------------------------------------------------------

const WAIT_LIMIT: Duration = Duration::from_secs(10);

pub async fn wait_recognition(recognition: &RecognitionService, task_id: &str) -> TaskStatus {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        let status = recognition.get_status(task_id).await.unwrap();
        if status.finished {
            return status;
        }
        assert!(Instant::now() < deadline, "recognition task {} never finished", task_id);
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_translation(translation: &TranslationService, task_id: &str) -> TaskStatus {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        let status = translation.get_status(task_id).await.unwrap();
        if status.finished {
            return status;
        }
        assert!(Instant::now() < deadline, "translation task {} never finished", task_id);
        sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_paper(papers: &PaperService, id: &str) -> Paper {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        let paper = papers.get(id).await.unwrap();
        if paper.status.is_terminal() {
            return paper;
        }
        assert!(Instant::now() < deadline, "paper {} stuck in {:?}", id, paper.status);
        sleep(Duration::from_millis(10)).await;
    }
}
