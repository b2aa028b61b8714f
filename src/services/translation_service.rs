//! Rate-limited streaming translation.
//!
//! Text is cut into sentence-aligned segments and each segment is sent to
//! the chat backend in order. A cluster-wide [`DistSemaphore`] caps how many
//! translation runs talk to the backend at once.

use crate::{
    backends::ChatBackend,
    config::PipelineSettings,
    coordination::{CoordinationStore, DistSemaphore, TaskStatusStore},
    errors::{Error, Result},
    models::task::TaskStatus,
    text::{segment, split_sentences},
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn prompt(language: &str, segment: &str) -> String {
    format!("Translate the following text into {}:\n{}", language, segment)
}

#[derive(Clone)]
pub struct TranslationService {
    chat: Arc<dyn ChatBackend>,
    semaphore: DistSemaphore,
    tasks: TaskStatusStore,
    settings: Arc<PipelineSettings>,
}

impl TranslationService {
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        coordination: Arc<dyn CoordinationStore>,
        tasks: TaskStatusStore,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        let semaphore = DistSemaphore::new(
            coordination,
            settings.semaphore_name.clone(),
            settings.translation_concurrency,
        );
        Self {
            chat,
            semaphore,
            tasks,
            settings,
        }
    }

    /// Split `text` into segments and translate them in the background.
    pub async fn submit(&self, text: &str, target_language: &str) -> Result<String> {
        if target_language.trim().is_empty() {
            return Err(Error::validation("targetLanguage is required"));
        }
        if text.trim().is_empty() {
            return Err(Error::validation("text is required"));
        }

        let segments = segment(split_sentences(text), self.settings.segment_word_budget);
        let task_id = self.tasks.create().await?;
        info!(
            "translation task {} into {} ({} segments)",
            task_id,
            target_language,
            segments.len()
        );

        let service = self.clone();
        let task = task_id.clone();
        let language = target_language.to_string();
        tokio::spawn(async move {
            service.run(&task, &segments, &language).await;
        });

        Ok(task_id)
    }

    pub async fn get_status(&self, task_id: &str) -> Result<TaskStatus> {
        self.tasks.get(task_id).await
    }

    /// Drop every outstanding permit, including ones leaked by crashed runs.
    pub async fn reset_permits(&self) -> Result<()> {
        warn!("resetting semaphore {}", self.semaphore.name());
        self.semaphore.reset().await
    }

    pub async fn permits_in_use(&self) -> Result<i64> {
        self.semaphore.in_use().await
    }

    async fn run(&self, task_id: &str, segments: &[String], language: &str) {
        let text = match self.translate(segments, language).await {
            Ok(text) => text,
            Err(err) => {
                error!("translation task {} failed: {}", task_id, err);
                String::new()
            }
        };
        if let Err(err) = self.tasks.finish(task_id, &text).await {
            error!("recording result of translation task {}: {}", task_id, err);
            return;
        }
        info!("translation task {} finished ({} bytes)", task_id, text.len());
    }

    /// Translate under one semaphore permit. The permit is returned whether
    /// or not the segments succeed.
    async fn translate(&self, segments: &[String], language: &str) -> Result<String> {
        self.semaphore
            .acquire_within(self.settings.semaphore_poll, self.settings.semaphore_wait)
            .await?;
        debug!(
            "acquired {} permit (max {})",
            self.semaphore.name(),
            self.semaphore.max()
        );

        let outcome = self.translate_segments(segments, language).await;

        if let Err(err) = self.semaphore.release().await {
            warn!("releasing {} permit: {}", self.semaphore.name(), err);
        }
        outcome
    }

    async fn translate_segments(&self, segments: &[String], language: &str) -> Result<String> {
        let mut translated = String::new();
        for segment in segments {
            let mut fragments = self.chat.stream(&prompt(language, segment)).await?;
            while let Some(fragment) = fragments.next().await {
                translated.push_str(&fragment?);
            }
        }
        Ok(translated)
    }
}
