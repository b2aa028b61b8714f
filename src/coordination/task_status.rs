use super::CoordinationStore;
use crate::{
    errors::{Error, Result},
    models::task::TaskStatus,
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

/// TTL-bounded `{text, finished}` records for detached background work.
///
/// Written once at submission and once more by the worker on completion;
/// pollers only read.
#[derive(Clone)]
pub struct TaskStatusStore {
    store: Arc<dyn CoordinationStore>,
    prefix: &'static str,
    ttl: Duration,
}

impl TaskStatusStore {
    pub fn new(store: Arc<dyn CoordinationStore>, prefix: &'static str, ttl: Duration) -> Self {
        Self { store, prefix, ttl }
    }

    fn key(&self, task_id: &str) -> String {
        format!("{}:{}", self.prefix, task_id)
    }

    /// Allocate a fresh task id and record it as unfinished.
    pub async fn create(&self) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        self.write(&task_id, &TaskStatus::pending()).await?;
        Ok(task_id)
    }

    /// Allocate a fresh task id that is already finished with `text`.
    pub async fn create_finished(&self, text: &str) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        self.finish(&task_id, text).await?;
        Ok(task_id)
    }

    pub async fn finish(&self, task_id: &str, text: &str) -> Result<()> {
        self.write(task_id, &TaskStatus::finished(text)).await
    }

    pub async fn get(&self, task_id: &str) -> Result<TaskStatus> {
        let raw = self
            .store
            .get(&self.key(task_id))
            .await?
            .ok_or_else(|| Error::not_found(format!("task `{}`", task_id)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write(&self, task_id: &str, status: &TaskStatus) -> Result<()> {
        let raw = serde_json::to_string(status)?;
        self.store.put(&self.key(task_id), &raw, self.ttl).await
    }
}
