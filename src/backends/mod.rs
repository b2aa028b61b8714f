//! Capability interfaces for everything the pipeline calls out to, plus the
//! adapters used in production.
//!
//! The stage services only ever see these traits, so tests swap in fakes and
//! deployments can swap vendors without touching the pipeline.

use crate::errors::Result;
use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, path::{Path, PathBuf}, time::Duration};
use tempfile::TempDir;

pub mod chat;
pub mod notifier;
pub mod rasterizer;
pub mod recognizer;

pub use chat::HttpChatBackend;
pub use notifier::{LogNotifier, WebhookNotifier};
pub use rasterizer::ImageMagickRasterizer;
pub use recognizer::HttpRecognizer;

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream>;

    /// Length of the object in bytes, or `None` when it does not exist.
    async fn size(&self, bucket: &str, key: &str) -> Result<Option<u64>>;

    /// Keys under `prefix`, in lexicographic order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    /// A URL granting `method` on the object for `ttl`.
    fn sign_url(&self, bucket: &str, key: &str, method: &Method, ttl: Duration) -> Result<String>;

    /// Append `data` at `offset`, which must equal the current object length.
    /// Returns the offset for the next append.
    async fn append(&self, bucket: &str, key: &str, data: Bytes, offset: u64) -> Result<u64>;

    async fn copy(&self, bucket: &str, src_key: &str, dst_key: &str) -> Result<()>;
}

/// Page images produced from one document. Dropping it removes the images.
#[derive(Debug)]
pub struct RasterizedPages {
    pub pages: Vec<PathBuf>,
    dir: TempDir,
}

impl RasterizedPages {
    pub fn new(pages: Vec<PathBuf>, dir: TempDir) -> Self {
        Self { pages, dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page of the local document into an image, in page order.
    async fn rasterize(&self, document: &Path) -> Result<RasterizedPages>;
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Extract text from the image behind `image_url`.
    async fn recognize(&self, image_url: &str) -> Result<String>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `prompt` and stream back the reply fragment by fragment.
    async fn stream(&self, prompt: &str) -> Result<TextStream>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
