//! Queue processing and status reconciliation
//!
//! A batch claims queued entries, abandoned `processing` entries and
//! partially extracted documents, runs the extractor on each, then decides
//! between completed, resumable and failed for both the queue entry and
//! its source.

use crate::config::{Config, QueueConfig};
use crate::error::{Error, Result};
use crate::extract::{ExtractionOutcome, PageExtractor, PopplerRasterizer};
use crate::meta::{MetaDb, ProcessingStatus, QueueEntry};
use crate::ocr::OcrChain;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happened to one claimed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOutcome {
    /// Every page is persisted; entry and source are completed
    Completed,
    /// Some pages remain; entry stays `processing` for the next batch
    Resumable,
    /// Nothing could be extracted; entry and source are failed
    Failed,
}

/// Result for one document in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub filename: String,
    pub outcome: EntryOutcome,
    pub pages: Option<ExtractionOutcome>,
    pub error: Option<String>,
}

/// Summary of one batch run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub resumable: usize,
    pub documents: Vec<DocumentResult>,
}

impl BatchReport {
    fn record(&mut self, result: DocumentResult) {
        match result.outcome {
            EntryOutcome::Completed => self.processed += 1,
            EntryOutcome::Resumable => self.resumable += 1,
            EntryOutcome::Failed => self.failed += 1,
        }
        self.documents.push(result);
    }
}

/// Single logical worker over the ingestion queue
pub struct QueueProcessor {
    db: MetaDb,
    extractor: PageExtractor,
    stale_after: Duration,
}

impl QueueProcessor {
    pub fn new(db: MetaDb, extractor: PageExtractor, queue_config: &QueueConfig) -> Self {
        Self {
            db,
            extractor,
            stale_after: queue_config.stale_after(),
        }
    }

    /// Processor with the poppler rasterizer and the configured OCR chain
    pub fn from_config(config: &Config, db: MetaDb, show_progress: bool) -> Result<Self> {
        let ocr = OcrChain::from_config(&config.ocr)?;
        info!(models = ?ocr.model_names(), "OCR chain ready");

        let extractor = PageExtractor::new(
            db.clone(),
            Arc::new(PopplerRasterizer::new(config.ocr.dpi)),
            Arc::new(ocr),
            config.chunk.clone(),
        )
        .with_progress(show_progress);

        Ok(Self::new(db, extractor, &config.queue))
    }

    /// Claim up to `limit` entries and process them one document at a time.
    ///
    /// Failures are isolated per document and never abort the batch.
    pub async fn run_batch(&self, limit: usize) -> Result<BatchReport> {
        let stale = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| Error::Config(format!("queue.stale_after_secs out of range: {}", e)))?;
        let entries = self.db.claimable_entries(Utc::now() - stale, limit).await?;

        info!(claimed = entries.len(), limit, "Starting batch");

        let mut report = BatchReport::default();

        for entry in entries {
            match self.process_entry(&entry).await {
                Ok(result) => report.record(result),
                Err(e) => {
                    error!(filename = %entry.filename, "Queue entry could not be processed: {}", e);
                    report.record(DocumentResult {
                        filename: entry.filename.clone(),
                        outcome: EntryOutcome::Failed,
                        pages: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            resumable = report.resumable,
            "Batch finished"
        );
        Ok(report)
    }

    async fn process_entry(&self, entry: &QueueEntry) -> Result<DocumentResult> {
        self.db.mark_queue_processing(&entry.id).await?;
        let superseded = self
            .db
            .supersede_queue_siblings(&entry.filename, &entry.id)
            .await?;
        if superseded > 0 {
            debug!(filename = %entry.filename, superseded, "Closed duplicate queue entries");
        }

        let Some(source) = self.db.get_source_by_filename(&entry.filename).await? else {
            let message = format!("no source record for {}", entry.filename);
            warn!(filename = %entry.filename, "{}", message);
            self.db.mark_queue_failed(&entry.id, &message).await?;
            return Ok(DocumentResult {
                filename: entry.filename.clone(),
                outcome: EntryOutcome::Failed,
                pages: None,
                error: Some(message),
            });
        };

        match self
            .extractor
            .extract(&source.id, Path::new(&source.file_path))
            .await
        {
            Ok(pages) => {
                let chunks = self.db.count_chunks(&source.id).await?;
                let outcome = if pages.is_complete() {
                    self.db
                        .set_source_status(&source.id, ProcessingStatus::Completed)
                        .await?;
                    self.db.mark_queue_completed(&entry.id).await?;
                    info!(filename = %entry.filename, chunks, "Document completed");
                    EntryOutcome::Completed
                } else {
                    let remaining = pages.total_pages - pages.new_pages_processed - pages.skipped_pages;
                    let note = format!("{} of {} pages pending", remaining, pages.total_pages);
                    self.db.mark_queue_resumable(&entry.id, Some(&note)).await?;
                    info!(filename = %entry.filename, chunks, remaining, "Document left for resume");
                    EntryOutcome::Resumable
                };

                Ok(DocumentResult {
                    filename: entry.filename.clone(),
                    outcome,
                    pages: Some(pages),
                    error: None,
                })
            }
            Err(e) => {
                let message = e.to_string();
                let chunks = self.db.count_chunks(&source.id).await?;

                let outcome = if chunks > 0 {
                    warn!(
                        filename = %entry.filename,
                        chunks,
                        "Extraction failed after partial progress, keeping for resume: {}", message
                    );
                    self.db.mark_queue_resumable(&entry.id, Some(&message)).await?;
                    EntryOutcome::Resumable
                } else {
                    error!(filename = %entry.filename, "Extraction failed: {}", message);
                    self.db.mark_queue_failed(&entry.id, &message).await?;
                    self.db
                        .set_source_status(&source.id, ProcessingStatus::Failed)
                        .await?;
                    EntryOutcome::Failed
                };

                Ok(DocumentResult {
                    filename: entry.filename.clone(),
                    outcome,
                    pages: None,
                    error: Some(message),
                })
            }
        }
    }
}
