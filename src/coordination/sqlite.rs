//! SQLite-backed coordination store.
//!
//! Each trait method is exactly one SQL statement, so SQLite's per-statement
//! atomicity gives the compare-and-set semantics the lock and semaphore need.

use super::CoordinationStore;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

#[derive(Clone)]
pub struct SqliteCoordinationStore {
    db: SqlitePool,
}

impl SqliteCoordinationStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(ttl: Duration) -> i64 {
    now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl CoordinationStore for SqliteCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // An expired row counts as absent and is taken over in place.
        let result = sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
             WHERE kv_entries.expires_at IS NOT NULL AND kv_entries.expires_at <= ?",
        )
        .bind(key)
        .bind(value)
        .bind(expiry_ms(ttl))
        .bind(now_ms())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key = ? AND value = ?")
            .bind(key)
            .bind(value)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expiry_ms(ttl))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_entries
             WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.db)
        .await?;
        Ok(value)
    }

    async fn incr_bounded(&self, name: &str, max: i64) -> Result<bool> {
        if max < 1 {
            return Ok(false);
        }
        let result = sqlx::query(
            "INSERT INTO kv_counters (name, value) VALUES (?, 1)
             ON CONFLICT(name) DO UPDATE SET value = kv_counters.value + 1
             WHERE kv_counters.value < ?",
        )
        .bind(name)
        .bind(max)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn decr_floored(&self, name: &str) -> Result<()> {
        sqlx::query("UPDATE kv_counters SET value = value - 1 WHERE name = ? AND value > 0")
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn remove_counter(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_counters WHERE name = ?")
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn counter(&self, name: &str) -> Result<i64> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM kv_counters WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;
        Ok(value.unwrap_or(0))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now_ms())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}
