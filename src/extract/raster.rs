//! Page rasterization via poppler-utils

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Turns document pages into images for OCR
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document
    async fn page_count(&self, path: &Path) -> Result<u32>;

    /// Render one page (1-based) to PNG bytes
    async fn render_page(&self, path: &Path, page: u32, total_pages: u32) -> Result<Vec<u8>>;
}

/// Rasterizer backed by the `pdfinfo` and `pdftoppm` binaries
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

/// Read the `Pages:` line of `pdfinfo` output
pub fn parse_page_count(pdfinfo_output: &str) -> Option<u32> {
    pdfinfo_output
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|count| count.parse().ok())
}

#[async_trait]
impl PageRasterizer for PopplerRasterizer {
    async fn page_count(&self, path: &Path) -> Result<u32> {
        let output = Command::new("pdfinfo")
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                Error::PageCount(format!("{}: pdfinfo unavailable ({})", path.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::PageCount(format!(
                "{}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_page_count(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| Error::PageCount(path.display().to_string()))
    }

    async fn render_page(&self, path: &Path, page: u32, total_pages: u32) -> Result<Vec<u8>> {
        if page == 0 || page > total_pages {
            return Err(Error::Raster(format!(
                "page {} out of range (document has {})",
                page, total_pages
            )));
        }

        let temp_dir = TempDir::new()?;
        let prefix = temp_dir.path().join("page");
        let page_arg = page.to_string();

        debug!(path = %path.display(), page, dpi = self.dpi, "Rasterizing page");
        let status = Command::new("pdftoppm")
            .args(["-png", "-r", &self.dpi.to_string(), "-f", &page_arg, "-l", &page_arg])
            .arg("-singlefile")
            .arg(path)
            .arg(&prefix)
            .status()
            .await
            .map_err(|e| Error::Raster(format!("pdftoppm unavailable: {}", e)))?;

        if !status.success() {
            return Err(Error::Raster(format!(
                "pdftoppm failed on page {} of {}",
                page,
                path.display()
            )));
        }

        let image = tokio::fs::read(prefix.with_extension("png")).await?;
        Ok(image)
    }
}
