//! Distributed mutual exclusion over a [`CoordinationStore`].

use super::CoordinationStore;
use crate::errors::{Error, Result};
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_RETRY: Duration = Duration::from_micros(500);

/// A named lock whose record self-expires after `expiry`.
///
/// The holder must finish its critical section well inside `expiry`; once the
/// record expires another caller can take the lock even if this holder never
/// unlocked.
pub struct DistLock {
    store: Arc<dyn CoordinationStore>,
    name: String,
    key: String,
    token: String,
    expiry: Duration,
    retry: Duration,
}

impl DistLock {
    pub fn new(store: Arc<dyn CoordinationStore>, name: impl Into<String>, expiry: Duration) -> Self {
        let name = name.into();
        Self {
            store,
            key: format!("lock:{}", name),
            name,
            token: Uuid::new_v4().to_string(),
            expiry,
            retry: DEFAULT_RETRY,
        }
    }

    /// Override the poll interval used by [`DistLock::lock`].
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the lock if nobody holds it.
    pub async fn try_lock(&self) -> Result<bool> {
        self.store
            .set_if_absent(&self.key, &self.token, self.expiry)
            .await
    }

    /// Poll [`DistLock::try_lock`] until it succeeds or `timeout` elapses.
    pub async fn lock(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_lock().await? {
                debug!("acquired lock {}", self.name);
                return Ok(());
            }
            if Instant::now() + self.retry > deadline {
                return Err(Error::LockTimeout(self.name.clone()));
            }
            sleep(self.retry).await;
        }
    }

    /// Release the lock if this holder still owns it. A lock that already
    /// expired, or was taken over by someone else, is left alone.
    pub async fn unlock(&self) -> Result<()> {
        let released = self.store.delete_if_equals(&self.key, &self.token).await?;
        if !released {
            debug!("lock {} was no longer held at unlock", self.name);
        }
        Ok(())
    }
}
