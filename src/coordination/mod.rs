//! Cross-instance coordination primitives over a shared key-value store.
//!
//! Every operation on [`CoordinationStore`] must be a single atomic step on
//! the backing store: the lock and semaphore built on top rely on it to stay
//! correct when several service instances race on the same key.

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod lock;
pub mod semaphore;
pub mod sqlite;
pub mod task_status;

pub use lock::DistLock;
pub use semaphore::DistSemaphore;
pub use sqlite::SqliteCoordinationStore;
pub use task_status::TaskStatusStore;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create `key` only if it is absent (or expired). Returns whether this
    /// call created it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it currently holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool>;

    /// Unconditionally write `key`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Read a live (unexpired) value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Increment counter `name` unless that would exceed `max`. Returns
    /// whether the increment happened.
    async fn incr_bounded(&self, name: &str, max: i64) -> Result<bool>;

    /// Decrement counter `name` unless it is already zero.
    async fn decr_floored(&self, name: &str) -> Result<()>;

    async fn remove_counter(&self, name: &str) -> Result<()>;

    async fn counter(&self, name: &str) -> Result<i64>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}
