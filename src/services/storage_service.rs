//! src/services/storage_service.rs
//!
//! LocalBlobStore: the blob store the pipeline runs on when no external
//! object store is configured. Metadata lives in SQLite, payloads on disk
//! sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::{
    backends::{BlobStore, ByteStream},
    errors::{Error, Result},
    models::blob::BlobObject,
};
use async_trait::async_trait;
use axum::http::Method;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use reqwest::Url;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Disk + SQLite implementation of [`BlobStore`].
///
/// Signed URLs point at this service's own `/blobs` route and carry an MD5
/// signature over the method, bucket, key and expiry.
#[derive(Clone)]
pub struct LocalBlobStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: SqlitePool,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,

    public_url: String,
    secret: String,
}

impl LocalBlobStore {
    pub fn new(
        db: SqlitePool,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.into(),
            secret: secret.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> Result<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(Error::validation(format!("invalid object key `{}`", key)));
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    fn ensure_bucket_name_safe(&self, name: &str) -> Result<()> {
        let reason = if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
            Some("must be between 3 and 63 characters")
        } else if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            Some("allowed characters are lowercase letters, digits, dots, and hyphens")
        } else if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            Some("must start and end with a lowercase letter or digit")
        } else if name.contains("..") || name.contains("-.") || name.contains(".-") {
            Some("cannot contain consecutive dots or dot-hyphen combinations")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::validation(format!("bucket `{}` invalid: {}", name, reason))),
            None => Ok(()),
        }
    }

    fn ensure_location_safe(&self, bucket: &str, key: &str) -> Result<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Construct a fully-qualified payload path. Parent directories may not
    /// exist yet.
    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.join(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<Option<BlobObject>> {
        let object = sqlx::query_as::<_, BlobObject>(
            "SELECT bucket, key, size_bytes, etag, last_modified
             FROM blob_objects WHERE bucket = ? AND key = ?",
        )
        .bind(bucket)
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(object)
    }

    async fn record_object(
        &self,
        bucket: &str,
        key: &str,
        size_bytes: i64,
        etag: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blob_objects (bucket, key, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(size_bytes)
        .bind(etag)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Stream a payload to disk and record its metadata.
    ///
    /// Writes go to a temporary sibling file that is fsynced and renamed
    /// into place, so readers never observe a partial object.
    async fn write_object<S>(&self, bucket: &str, key: &str, stream: S) -> Result<()>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.object_path(bucket, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = Self::write_tmp(&tmp_path, stream).await;
        let (size_bytes, etag) = match written {
            Ok(summary) => summary,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        self.record_object(bucket, key, size_bytes, Some(etag)).await
    }

    async fn write_tmp<S>(tmp_path: &Path, stream: S) -> io::Result<(i64, String)>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut file = File::create(tmp_path).await?;
        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    /// Metadata plus an open handle, ready for streaming out.
    pub async fn open_reader(&self, bucket: &str, key: &str) -> Result<(BlobObject, File)> {
        self.ensure_location_safe(bucket, key)?;
        let missing = || Error::not_found(format!("object `{}/{}`", bucket, key));
        let object = self.fetch_object(bucket, key).await?.ok_or_else(missing)?;

        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    missing()
                } else {
                    Error::Io(err)
                }
            })?;
        Ok((object, file))
    }

    fn signature(&self, method: &str, bucket: &str, key: &str, expires: i64) -> String {
        let digest = md5::compute(format!(
            "{}\n{}\n{}\n{}\n{}",
            self.secret, method, bucket, key, expires
        ));
        general_purpose::URL_SAFE_NO_PAD.encode(digest.0)
    }

    /// Check a signature produced by [`BlobStore::sign_url`].
    pub fn verify_signature(
        &self,
        method: &str,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> bool {
        expires >= Utc::now().timestamp()
            && signatures_match(&self.signature(method, bucket, key, expires), signature)
    }
}

/// Byte comparison that does not stop at the first mismatch.
fn signatures_match(expected: &str, given: &str) -> bool {
    expected.len() == given.len()
        && expected
            .bytes()
            .zip(given.bytes())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        self.ensure_location_safe(bucket, key)?;
        self.write_object(bucket, key, stream::once(async move { Ok(data) }))
            .await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let (_, file) = self.open_reader(bucket, key).await?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn size(&self, bucket: &str, key: &str) -> Result<Option<u64>> {
        self.ensure_location_safe(bucket, key)?;
        Ok(self
            .fetch_object(bucket, key)
            .await?
            .map(|object| object.size_bytes.max(0) as u64))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.ensure_bucket_name_safe(bucket)?;
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT key FROM blob_objects
             WHERE bucket = ? AND substr(key, 1, length(?)) = ?
             ORDER BY key ASC",
        )
        .bind(bucket)
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.db)
        .await?;
        Ok(keys)
    }

    fn sign_url(&self, bucket: &str, key: &str, method: &Method, ttl: Duration) -> Result<String> {
        self.ensure_location_safe(bucket, key)?;
        let expires = Utc::now().timestamp() + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2);
        let signature = self.signature(method.as_str(), bucket, key, expires);

        let mut url = Url::parse(&self.public_url)
            .map_err(|err| Error::validation(format!("public url `{}`: {}", self.public_url, err)))?;
        url.path_segments_mut()
            .map_err(|_| Error::validation("public url cannot carry a path"))?
            .pop_if_empty()
            .push("blobs")
            .push(bucket)
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("method", method.as_str())
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.to_string())
    }

    async fn append(&self, bucket: &str, key: &str, data: Bytes, offset: u64) -> Result<u64> {
        self.ensure_location_safe(bucket, key)?;
        let current = self
            .fetch_object(bucket, key)
            .await?
            .map(|object| object.size_bytes.max(0) as u64)
            .unwrap_or(0);
        // offset 0 starts the object over
        if offset != 0 && current != offset {
            return Err(Error::validation(format!(
                "append position {} does not match length {} of `{}/{}`",
                offset, current, bucket, key
            )));
        }

        let file_path = self.object_path(bucket, key);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if offset == 0 {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let mut file = options.open(&file_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;

        let next = offset + data.len() as u64;
        debug!("appended {} bytes to {}/{} (now {})", data.len(), bucket, key, next);
        self.record_object(bucket, key, next as i64, None).await?;
        Ok(next)
    }

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()> {
        self.ensure_key_safe(dst_key)?;
        let (_, file) = self.open_reader(bucket, src_key).await?;
        self.write_object(bucket, dst_key, ReaderStream::new(file))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> LocalBlobStore {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        LocalBlobStore::new(db, "/tmp/unused", "http://localhost:3000", "secret")
    }

    #[tokio::test]
    async fn signed_url_round_trips_through_verification() {
        let store = store().await;
        let url = store
            .sign_url("papers", "files/a b.pdf", &Method::GET, Duration::from_secs(60))
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/blobs/papers/files/a%20b.pdf");

        let query: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        let expires: i64 = query["expires"].parse().unwrap();
        let signature = &query["signature"];
        assert!(store.verify_signature("GET", "papers", "files/a b.pdf", expires, signature));
        assert!(!store.verify_signature("PUT", "papers", "files/a b.pdf", expires, signature));
        assert!(!store.verify_signature("GET", "papers", "files/other.pdf", expires, signature));
        assert!(!store.verify_signature("GET", "papers", "files/a b.pdf", 0, signature));
    }

    #[test]
    fn signature_comparison_needs_every_byte() {
        assert!(signatures_match("abc123", "abc123"));
        assert!(!signatures_match("abc123", "abc124"));
        assert!(!signatures_match("abc123", "xbc123"));
        assert!(!signatures_match("abc123", "abc12"));
        assert!(!signatures_match("abc", ""));
    }

    #[tokio::test]
    async fn rejects_unsafe_locations() {
        let store = store().await;
        assert!(store.ensure_key_safe("../etc/passwd").is_err());
        assert!(store.ensure_key_safe("/abs").is_err());
        assert!(store.ensure_key_safe("chunks/h/0").is_ok());
        assert!(store.ensure_bucket_name_safe("Papers").is_err());
        assert!(store.ensure_bucket_name_safe("-papers").is_err());
        assert!(store.ensure_bucket_name_safe("papers").is_ok());
    }
}
