//! Process command - run one batch of the ingestion queue

use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::queue::{BatchReport, EntryOutcome, QueueProcessor};
use tracing::info;

/// Process up to `limit` queued documents (configured batch limit by default)
pub async fn cmd_process(
    config: &Config,
    db: &MetaDb,
    limit: Option<usize>,
    show_progress: bool,
) -> Result<BatchReport> {
    let limit = limit.unwrap_or(config.queue.batch_limit);
    info!(limit, "Processing ingestion queue");

    let processor = QueueProcessor::from_config(config, db.clone(), show_progress)?;
    processor.run_batch(limit).await
}

/// Print batch results to console
pub fn print_batch_report(report: &BatchReport) {
    println!("\n📄 Processing Complete\n");

    if report.documents.is_empty() {
        println!("Nothing to process. Use 'pagewise scan' to queue documents.");
        return;
    }

    for doc in &report.documents {
        let marker = match doc.outcome {
            EntryOutcome::Completed => "✓",
            EntryOutcome::Resumable => "…",
            EntryOutcome::Failed => "✗",
        };
        match &doc.pages {
            Some(pages) => println!(
                "{} {} ({} new, {} skipped, {} of {} pages)",
                marker,
                doc.filename,
                pages.new_pages_processed,
                pages.skipped_pages,
                pages.new_pages_processed + pages.skipped_pages,
                pages.total_pages
            ),
            None => println!("{} {}", marker, doc.filename),
        }
        if let Some(error) = &doc.error {
            println!("    {}", error);
        }
    }

    println!("\nProcessed: {}", report.processed);
    println!("Failed: {}", report.failed);
    if report.resumable > 0 {
        println!("Resumable (will continue next run): {}", report.resumable);
    }
}
