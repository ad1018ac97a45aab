//! Ingestion queue
//!
//! Enqueueing upserts the per-document source record and appends a queue
//! entry; the [`processor`] claims entries and drives extraction.

pub mod processor;

pub use processor::*;

use crate::error::Result;
use crate::meta::{EnqueuedDocument, KnowledgeSource, MetaDb, QueueEntry};
use crate::scan::{Classification, ClassifiedDocument};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Counts from one enqueue call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueStats {
    pub enqueued: usize,
    /// Chunks removed because the document content changed
    pub chunks_reset: u64,
    /// Documents that could not be registered, with the reason
    pub errors: Vec<String>,
}

/// Register classified documents as sources and queue them for processing.
///
/// Unchanged documents are ignored. Updated documents lose their previous
/// chunks; retried documents keep them so extraction resumes. Each document
/// is registered atomically and a failure on one does not stop the others.
pub async fn enqueue(db: &MetaDb, docs: &[ClassifiedDocument]) -> EnqueueStats {
    let mut stats = EnqueueStats::default();

    for doc in docs.iter().filter(|d| d.classification.needs_ingestion()) {
        match enqueue_one(db, doc).await {
            Ok(registered) => {
                if registered.chunks_reset > 0 {
                    debug!(
                        filename = %doc.filename,
                        removed = registered.chunks_reset,
                        "Cleared chunks of changed document"
                    );
                }
                stats.chunks_reset += registered.chunks_reset;
                if registered.queued {
                    stats.enqueued += 1;
                }
            }
            Err(e) => {
                let error_msg = format!("{}: {}", doc.filename, e);
                warn!(%error_msg, "Failed to enqueue document");
                stats.errors.push(error_msg);
            }
        }
    }

    info!(
        enqueued = stats.enqueued,
        chunks_reset = stats.chunks_reset,
        errors = stats.errors.len(),
        "Enqueued documents"
    );
    stats
}

async fn enqueue_one(db: &MetaDb, doc: &ClassifiedDocument) -> Result<EnqueuedDocument> {
    let mut source = KnowledgeSource::new(
        doc.filename.clone(),
        doc.path.display().to_string(),
        doc.file_hash.clone(),
        doc.metadata.title.clone(),
    );
    source.author = doc.metadata.author.clone();
    source.publication_year = doc.metadata.publication_year;
    source.isbn = doc.metadata.isbn.clone();
    source.priority = doc.metadata.priority.to_string();
    source.set_topics(&doc.metadata.topics);

    let entry = QueueEntry::new(
        doc.filename.clone(),
        source.file_path.clone(),
        doc.file_hash.clone(),
        doc.metadata.priority.queue_weight(),
    );

    db.enqueue_document(
        &source,
        doc.classification == Classification::Updated,
        &entry,
    )
    .await
}
