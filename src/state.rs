//! Service wiring shared by every handler.

use crate::{
    backends::{
        BlobStore, ChatBackend, HttpChatBackend, HttpRecognizer, ImageMagickRasterizer,
        LogNotifier, Notifier, WebhookNotifier,
    },
    config::{AppConfig, PipelineSettings},
    coordination::{CoordinationStore, SqliteCoordinationStore, TaskStatusStore},
    repository::{SqlitePaperRepository, SqliteRecognitionCache, SqliteUploadRepository},
    services::{LocalBlobStore, PaperService, RecognitionService, TranslationService, UploadService},
};
use axum::extract::FromRef;
use reqwest::Client;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub blobs: LocalBlobStore,
    pub coordination: Arc<dyn CoordinationStore>,
    pub uploads: UploadService,
    pub recognition: RecognitionService,
    pub translation: TranslationService,
    pub papers: PaperService,
}

impl AppState {
    pub fn new(cfg: &AppConfig, db: SqlitePool) -> anyhow::Result<Self> {
        let settings = Arc::new(PipelineSettings::from_config(cfg));
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let blobs = LocalBlobStore::new(
            db.clone(),
            cfg.storage_dir.clone(),
            cfg.public_url.clone(),
            cfg.signing_secret.clone(),
        );
        let shared_blobs: Arc<dyn BlobStore> = Arc::new(blobs.clone());
        let coordination: Arc<dyn CoordinationStore> =
            Arc::new(SqliteCoordinationStore::new(db.clone()));

        let chat: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(
            client.clone(),
            cfg.chat_base_url.clone(),
            cfg.chat_api_key.clone(),
            cfg.chat_model.clone(),
        ));
        let notifier: Arc<dyn Notifier> = match &cfg.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::spawn(client.clone(), url.clone())),
            None => Arc::new(LogNotifier),
        };

        let uploads = UploadService::new(
            Arc::new(SqliteUploadRepository::new(db.clone())),
            shared_blobs.clone(),
            coordination.clone(),
            settings.clone(),
            cfg.bucket.clone(),
        );
        let recognition = RecognitionService::new(
            Arc::new(SqliteRecognitionCache::new(db.clone())),
            shared_blobs,
            Arc::new(ImageMagickRasterizer::default()),
            Arc::new(HttpRecognizer::new(
                client,
                cfg.recognizer_url.clone(),
                cfg.recognizer_token.clone(),
            )),
            TaskStatusStore::new(coordination.clone(), "ocr", settings.task_ttl),
            settings.clone(),
        );
        let translation = TranslationService::new(
            chat,
            coordination.clone(),
            TaskStatusStore::new(coordination.clone(), "translation", settings.task_ttl),
            settings.clone(),
        );
        let papers = PaperService::new(
            Arc::new(SqlitePaperRepository::new(db.clone())),
            uploads.clone(),
            recognition.clone(),
            translation.clone(),
            notifier,
            settings,
        );

        Ok(Self {
            db,
            blobs,
            coordination,
            uploads,
            recognition,
            translation,
            papers,
        })
    }
}

impl FromRef<AppState> for LocalBlobStore {
    fn from_ref(state: &AppState) -> Self {
        state.blobs.clone()
    }
}

impl FromRef<AppState> for UploadService {
    fn from_ref(state: &AppState) -> Self {
        state.uploads.clone()
    }
}

impl FromRef<AppState> for RecognitionService {
    fn from_ref(state: &AppState) -> Self {
        state.recognition.clone()
    }
}

impl FromRef<AppState> for TranslationService {
    fn from_ref(state: &AppState) -> Self {
        state.translation.clone()
    }
}

impl FromRef<AppState> for PaperService {
    fn from_ref(state: &AppState) -> Self {
        state.papers.clone()
    }
}
