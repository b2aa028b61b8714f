use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cached recognition output for one source object, keyed by
/// `(bucket, object_key, file_type)`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct RecognitionCacheEntry {
    /// Task id of the run that produced the text.
    pub id: String,
    pub bucket: String,
    pub object_key: String,
    pub file_type: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
