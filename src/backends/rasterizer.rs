use super::{RasterizedPages, Rasterizer};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, process::Command};
use tracing::debug;

const DENSITY: &str = "150";
const QUALITY: &str = "90";
const PAGE_STEM: &str = "page";

/// Shells out to ImageMagick's `convert`, one JPEG per page.
#[derive(Debug, Clone)]
pub struct ImageMagickRasterizer {
    program: String,
}

impl Default for ImageMagickRasterizer {
    fn default() -> Self {
        Self {
            program: "convert".into(),
        }
    }
}

#[async_trait]
impl Rasterizer for ImageMagickRasterizer {
    async fn rasterize(&self, document: &Path) -> Result<RasterizedPages> {
        let dir = tempfile::Builder::new().prefix("pages-").tempdir()?;
        let output = dir.path().join(format!("{}.jpg", PAGE_STEM));

        let status = Command::new(&self.program)
            .arg("-density")
            .arg(DENSITY)
            .arg(document)
            .arg("-quality")
            .arg(QUALITY)
            .arg(&output)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|err| Error::upstream("rasterizer", err))?;
        if !status.success() {
            return Err(Error::upstream(
                "rasterizer",
                format!("{} exited with {}", self.program, status),
            ));
        }

        let mut pages = Vec::new();
        let mut entries = fs::read_dir(dir.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                pages.push(entry.path());
            }
        }
        sort_pages(&mut pages);
        debug!("rasterized {} into {} pages", document.display(), pages.len());

        Ok(RasterizedPages::new(pages, dir))
    }
}

/// `convert` names multi-page output `page-0.jpg`, `page-1.jpg`, ... and a
/// single page plain `page.jpg`. Lexicographic order would put `page-10`
/// before `page-2`.
fn page_number(path: &Path) -> u64 {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit_once('-'))
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}

fn sort_pages(pages: &mut [PathBuf]) {
    pages.sort_by_key(|path| page_number(path));
}
