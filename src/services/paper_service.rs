//! The paper saga: recognition, then translation, then notification.
//!
//! Each paper runs as its own detached task. The saga talks to the stage
//! services only through their submit/status calls, so its progress is
//! visible to any instance through the paper record and the task statuses.

use crate::{
    backends::{Notifier, notifier::render_template},
    config::PipelineSettings,
    errors::{Error, Result},
    models::{
        paper::{CreatePaper, Paper, PaperStatus},
        task::TaskStatus,
        upload::UploadStatus,
    },
    repository::PaperRepository,
    services::{
        recognition_service::RecognitionService, translation_service::TranslationService,
        upload_service::UploadService,
    },
};
use chrono::Utc;
use std::{collections::HashMap, path::Path, sync::Arc};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const NOTIFY_SUBJECT: &str = "Your paper translation is ready";
pub const NOTIFY_TEMPLATE: &str = "{{Text}}";
const DEFAULT_FILE_TYPE: &str = "pdf";

#[derive(Debug, Clone, Copy)]
enum Stage {
    Recognition,
    Translation,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Recognition => "recognition",
            Stage::Translation => "translation",
        }
    }
}

/// Recognition file type from the merged file's extension.
fn file_type(file_path: &str) -> String {
    Path::new(file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string())
}

#[derive(Clone)]
pub struct PaperService {
    repo: Arc<dyn PaperRepository>,
    uploads: UploadService,
    recognition: RecognitionService,
    translation: TranslationService,
    notifier: Arc<dyn Notifier>,
    settings: Arc<PipelineSettings>,
}

impl PaperService {
    pub fn new(
        repo: Arc<dyn PaperRepository>,
        uploads: UploadService,
        recognition: RecognitionService,
        translation: TranslationService,
        notifier: Arc<dyn Notifier>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            repo,
            uploads,
            recognition,
            translation,
            notifier,
            settings,
        }
    }

    /// Persist a new paper in `ocr` and start its saga. Returns the initial
    /// snapshot without waiting for any stage.
    pub async fn create(&self, req: CreatePaper) -> Result<Paper> {
        if req.file_hash.trim().is_empty() || req.target_language.trim().is_empty() {
            return Err(Error::validation("fileHash and targetLanguage are required"));
        }

        let paper = Paper {
            id: Uuid::new_v4().to_string(),
            file_hash: req.file_hash,
            create_at: Utc::now(),
            status: PaperStatus::Ocr,
            email_to: req.email_to.filter(|to| !to.trim().is_empty()),
            target_language: req.target_language,
            result_text: None,
        };
        self.repo.create(&paper).await?;
        info!("paper {} created for file {}", paper.id, paper.file_hash);

        let service = self.clone();
        let snapshot = paper.clone();
        tokio::spawn(async move {
            service.run(snapshot).await;
        });

        Ok(paper)
    }

    pub async fn get(&self, id: &str) -> Result<Paper> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("paper `{}`", id)))
    }

    pub async fn list(&self) -> Result<Vec<Paper>> {
        self.repo.list().await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.repo.delete(id).await? {
            return Err(Error::not_found(format!("paper `{}`", id)));
        }
        info!("paper {} deleted", id);
        Ok(())
    }

    async fn run(&self, paper: Paper) {
        match self.advance(&paper).await {
            Ok(()) => info!("paper {} finished", paper.id),
            Err(err) => {
                error!("paper {} failed: {}", paper.id, err);
                if let Err(err) = self.repo.set_status(&paper.id, PaperStatus::Failed).await {
                    error!("marking paper {} failed: {}", paper.id, err);
                }
            }
        }
    }

    async fn advance(&self, paper: &Paper) -> Result<()> {
        let upload = self.uploads.query(&paper.file_hash).await?;
        let (Some(bucket), Some(file_path), UploadStatus::Uploaded) =
            (upload.bucket, upload.file_path, upload.status)
        else {
            return Err(Error::UploadIncomplete(paper.file_hash.clone()));
        };

        let task_id = self
            .recognition
            .submit(&bucket, &file_path, &file_type(&file_path))
            .await?;
        let text = self.wait_for(Stage::Recognition, &task_id).await?;

        self.repo
            .set_status(&paper.id, PaperStatus::Translation)
            .await?;
        let task_id = self
            .translation
            .submit(&text, &paper.target_language)
            .await?;
        let translated = self.wait_for(Stage::Translation, &task_id).await?;

        if let Some(to) = &paper.email_to {
            self.notify(to, &translated).await;
        }

        self.repo.complete(&paper.id, &translated).await
    }

    /// Poll a stage's task until it finishes. An empty result is a failure.
    async fn wait_for(&self, stage: Stage, task_id: &str) -> Result<String> {
        loop {
            let status: TaskStatus = match stage {
                Stage::Recognition => self.recognition.get_status(task_id).await?,
                Stage::Translation => self.translation.get_status(task_id).await?,
            };
            if status.finished {
                if status.text.is_empty() {
                    return Err(Error::EmptyResult { stage: stage.name() });
                }
                return Ok(status.text);
            }
            sleep(self.settings.status_poll).await;
        }
    }

    async fn notify(&self, to: &str, text: &str) {
        let vars = HashMap::from([("Text", text)]);
        let body = render_template(NOTIFY_TEMPLATE, &vars);
        if let Err(err) = self.notifier.send(to, NOTIFY_SUBJECT, &body).await {
            warn!("notifying {}: {}", to, err);
        }
    }
}
