//! Represents an object (blob) held by the local blob store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for a stored blob. The payload itself lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct BlobObject {
    /// Bucket namespace the blob belongs to.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload. Cleared for appendable objects, whose content
    /// is built incrementally.
    pub etag: Option<String>,

    /// Timestamp when the blob was last written.
    pub last_modified: DateTime<Utc>,
}
