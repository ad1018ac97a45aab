//! Resumable, page-granular document extraction
//!
//! Pages that already have persisted chunks are the resume checkpoint: they
//! are skipped, and every other page is rasterized, OCR'd, chunked and
//! persisted before the next page is touched.

mod raster;

pub use raster::*;

use crate::chunk::chunk_page;
use crate::config::ChunkConfig;
use crate::error::{Error, Result};
use crate::meta::{KnowledgeChunk, MetaDb};
use crate::ocr::OcrChain;
use crate::progress::page_progress_bar;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page counters for one extraction call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub total_pages: u32,
    pub new_pages_processed: u32,
    pub skipped_pages: u32,
    pub chunks_written: usize,
    /// Pages that produced no chunks this run (left for a later resume)
    pub failed_pages: Vec<u32>,
}

impl ExtractionOutcome {
    /// Every page is accounted for by this run or an earlier one
    pub fn is_complete(&self) -> bool {
        self.new_pages_processed + self.skipped_pages >= self.total_pages
    }
}

/// Extracts one document at a time into persisted chunks
pub struct PageExtractor {
    db: MetaDb,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<OcrChain>,
    chunk_config: ChunkConfig,
    show_progress: bool,
}

impl PageExtractor {
    pub fn new(
        db: MetaDb,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<OcrChain>,
        chunk_config: ChunkConfig,
    ) -> Self {
        Self {
            db,
            rasterizer,
            ocr,
            chunk_config,
            show_progress: false,
        }
    }

    /// Show a page progress bar while extracting
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Extract every not-yet-processed page of a document.
    ///
    /// Fails only when the page count cannot be determined. Page failures
    /// are logged and recorded in [`ExtractionOutcome::failed_pages`].
    pub async fn extract(&self, source_id: &str, file_path: &Path) -> Result<ExtractionOutcome> {
        let total_pages = self
            .rasterizer
            .page_count(file_path)
            .await
            .map_err(|e| match e {
                e @ Error::PageCount(_) => e,
                other => Error::PageCount(format!("{}: {}", file_path.display(), other)),
            })?;

        self.db.update_source_counts(source_id, total_pages).await?;

        let processed = self.db.processed_pages(source_id).await?;
        let last_processed = processed.iter().max().copied().unwrap_or(0);
        let mut next_index = self.db.next_chunk_index(source_id).await?;
        let mut filled_gap = false;
        let mut outcome = ExtractionOutcome {
            total_pages,
            ..ExtractionOutcome::default()
        };

        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!(
            %filename,
            source_id,
            total_pages,
            already_done = processed.len(),
            "Extracting document"
        );

        let pb = page_progress_bar(&filename, total_pages, self.show_progress);

        for page in 1..=total_pages {
            if processed.contains(&page) {
                outcome.skipped_pages += 1;
                pb.inc(1);
                continue;
            }

            match self
                .extract_page(source_id, file_path, page, total_pages, next_index)
                .await
            {
                Ok(0) => {
                    warn!(%filename, page, "No text extracted from page");
                    outcome.failed_pages.push(page);
                }
                Ok(written) => {
                    debug!(%filename, page, chunks = written, "Page persisted");
                    next_index += written as i64;
                    filled_gap |= page < last_processed;
                    outcome.new_pages_processed += 1;
                    outcome.chunks_written += written;
                }
                Err(e) => {
                    warn!(%filename, page, "Page failed: {}", e);
                    outcome.failed_pages.push(page);
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        if filled_gap {
            debug!(%filename, "Renumbering chunks after filling earlier pages");
            self.db.renumber_chunks(source_id).await?;
        }
        self.db.update_source_counts(source_id, total_pages).await?;

        info!(
            %filename,
            new = outcome.new_pages_processed,
            skipped = outcome.skipped_pages,
            failed = outcome.failed_pages.len(),
            chunks = outcome.chunks_written,
            "Extraction finished"
        );

        Ok(outcome)
    }

    /// Rasterize, OCR, chunk and persist one page; returns chunks written
    async fn extract_page(
        &self,
        source_id: &str,
        file_path: &Path,
        page: u32,
        total_pages: u32,
        first_index: i64,
    ) -> Result<usize> {
        let image = self
            .rasterizer
            .render_page(file_path, page, total_pages)
            .await?;
        let output = self.ocr.recognize(&image).await?;
        debug!(page, model = %output.model, chars = output.text.len(), "OCR complete");

        let chunks: Vec<KnowledgeChunk> = chunk_page(&output.text, page, &self.chunk_config)
            .into_iter()
            .enumerate()
            .map(|(offset, draft)| {
                KnowledgeChunk::new(
                    source_id.to_string(),
                    first_index + offset as i64,
                    i64::from(draft.page_number),
                    draft.text,
                    draft.hash,
                )
            })
            .collect();

        if chunks.is_empty() {
            return Ok(0);
        }

        self.db.insert_page_chunks(source_id, &chunks).await?;
        Ok(chunks.len())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ocr::OcrModel;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Rasterizer whose page images are just `page-N`
    pub struct ScriptedRasterizer {
        pub pages: Option<u32>,
    }

    #[async_trait]
    impl PageRasterizer for ScriptedRasterizer {
        async fn page_count(&self, path: &Path) -> Result<u32> {
            self.pages
                .ok_or_else(|| Error::PageCount(path.display().to_string()))
        }

        async fn render_page(&self, _path: &Path, page: u32, _total: u32) -> Result<Vec<u8>> {
            Ok(format!("page-{}", page).into_bytes())
        }
    }

    /// Deterministic text for a page, long enough to span several chunks
    pub fn page_text(page: u32) -> String {
        (0..30)
            .map(|i| format!("Page {} sentence {} describes a finding in detail.", page, i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// OCR model that reads the page number back out of the image
    #[derive(Default)]
    pub struct PageTextModel {
        pub failing: Mutex<HashSet<u32>>,
        pub blank: Mutex<HashSet<u32>>,
    }

    impl PageTextModel {
        pub fn failing(pages: &[u32]) -> Self {
            let model = Self::default();
            model.set_failing(pages);
            model
        }

        pub fn set_failing(&self, pages: &[u32]) {
            *self.failing.lock().unwrap() = pages.iter().copied().collect();
        }
    }

    #[async_trait]
    impl OcrModel for PageTextModel {
        async fn recognize(&self, image: &[u8]) -> Result<String> {
            let page: u32 = String::from_utf8_lossy(image)
                .trim_start_matches("page-")
                .parse()
                .map_err(|_| Error::Ocr("unreadable image".to_string()))?;

            if self.failing.lock().unwrap().contains(&page) {
                return Err(Error::Ocr(format!("page {} unreadable", page)));
            }
            if self.blank.lock().unwrap().contains(&page) {
                return Ok("  \n ".to_string());
            }
            Ok(page_text(page))
        }

        fn model_name(&self) -> &str {
            "page-text"
        }
    }
}
