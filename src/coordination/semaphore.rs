//! Distributed counting semaphore over a [`CoordinationStore`].
//!
//! Permits carry no owner and no lease: a holder that crashes before
//! `release` leaks its permit until an administrator calls `reset`.

use super::CoordinationStore;
use crate::errors::{Error, Result};
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, sleep};

#[derive(Clone)]
pub struct DistSemaphore {
    store: Arc<dyn CoordinationStore>,
    name: String,
    key: String,
    max: i64,
}

impl DistSemaphore {
    pub fn new(store: Arc<dyn CoordinationStore>, name: impl Into<String>, max: i64) -> Self {
        let name = name.into();
        Self {
            store,
            key: format!("semaphore:{}", name),
            name,
            max,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Take one permit if fewer than `max` are out.
    pub async fn acquire(&self) -> Result<bool> {
        self.store.incr_bounded(&self.key, self.max).await
    }

    /// Return one permit. Extra releases never push the count below zero.
    pub async fn release(&self) -> Result<()> {
        self.store.decr_floored(&self.key).await
    }

    /// Forget every outstanding permit.
    pub async fn reset(&self) -> Result<()> {
        self.store.remove_counter(&self.key).await
    }

    /// Permits currently handed out.
    pub async fn in_use(&self) -> Result<i64> {
        self.store.counter(&self.key).await
    }

    /// Poll [`DistSemaphore::acquire`] every `interval` until it succeeds or
    /// `budget` runs out. No fairness between waiters.
    pub async fn acquire_within(&self, interval: Duration, budget: Duration) -> Result<()> {
        let deadline = Instant::now() + budget;
        loop {
            sleep(interval).await;
            if self.acquire().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::WaitTimeout(self.name.clone()));
            }
        }
    }
}
