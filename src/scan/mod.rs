//! Source discovery and change detection
//!
//! Walks the documents directory, fingerprints each candidate file, loads its
//! metadata and classifies it against the persisted source records. Scanning
//! writes nothing; the caller decides whether to enqueue the result.

mod hash;
mod metadata;

pub use hash::*;
pub use metadata::*;

use crate::config::ScanConfig;
use crate::error::Result;
use crate::meta::{KnowledgeSource, MetaDb, ProcessingStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// How a scanned file relates to what is already persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// No source record exists for this filename
    New,
    /// The content fingerprint changed
    Updated,
    /// Same content, but the previous attempt failed or was never queued
    Retry,
    /// Same content and not failed; nothing to do
    Unchanged,
}

impl Classification {
    /// Decide what to do with a file given its existing record (if any).
    ///
    /// `queued` says whether an active queue entry exists for the file; a
    /// pending source without one would otherwise never be picked up.
    pub fn of(existing: Option<&KnowledgeSource>, file_hash: &str, queued: bool) -> Self {
        match existing {
            None => Classification::New,
            Some(source) if source.file_hash != file_hash => Classification::Updated,
            Some(source) => match source.status().ok() {
                Some(ProcessingStatus::Failed) => Classification::Retry,
                Some(ProcessingStatus::Pending) if !queued => Classification::Retry,
                _ => Classification::Unchanged,
            },
        }
    }

    /// Whether the file must go through the ingestion queue
    pub fn needs_ingestion(self) -> bool {
        !matches!(self, Classification::Unchanged)
    }
}

/// A scanned file together with its classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    pub filename: String,
    pub path: PathBuf,
    pub file_hash: String,
    pub metadata: DocumentMetadata,
    pub classification: Classification,
}

/// Result of scanning a directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub new_docs: Vec<ClassifiedDocument>,
    /// Updated and retry documents
    pub updated_docs: Vec<ClassifiedDocument>,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ScanReport {
    /// Every document that should be enqueued, new first
    pub fn to_enqueue(&self) -> Vec<ClassifiedDocument> {
        self.new_docs
            .iter()
            .chain(self.updated_docs.iter())
            .cloned()
            .collect()
    }
}

/// Scan a directory and classify every supported document in it.
///
/// A missing directory is created; if that fails the scan yields an empty
/// report. Failures on individual files are logged and recorded in
/// `errors`, and the scan carries on.
pub async fn scan_directory(db: &MetaDb, directory: &Path, config: &ScanConfig) -> ScanReport {
    let mut report = ScanReport::default();

    if !directory.is_dir() {
        if let Err(e) = std::fs::create_dir_all(directory) {
            warn!(
                path = %directory.display(),
                "Documents directory unavailable, nothing to scan: {}", e
            );
            return report;
        }
        info!(path = %directory.display(), "Created documents directory");
    }

    // Sources are keyed by filename, so a repeated name in a nested tree
    // would overwrite the first file's record on every scan.
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for path in candidate_files(directory, config) {
        let filename = file_name_of(&path);
        if let Some(first) = seen.get(&filename) {
            let error_msg = format!(
                "{}: duplicate filename, already scanned as {}",
                path.display(),
                first.display()
            );
            warn!(%error_msg, "Skipping file");
            report.errors.push(error_msg);
            continue;
        }
        seen.insert(filename, path.clone());

        match classify_file(db, &path).await {
            Ok(doc) => {
                debug!(filename = %doc.filename, classification = ?doc.classification, "Classified document");
                match doc.classification {
                    Classification::New => report.new_docs.push(doc),
                    Classification::Updated | Classification::Retry => {
                        report.updated_docs.push(doc)
                    }
                    Classification::Unchanged => report.skipped += 1,
                }
            }
            Err(e) => {
                let error_msg = format!("{}: {}", path.display(), e);
                warn!(%error_msg, "Skipping file");
                report.errors.push(error_msg);
            }
        }
    }

    info!(
        new = report.new_docs.len(),
        updated = report.updated_docs.len(),
        skipped = report.skipped,
        errors = report.errors.len(),
        "Scan complete"
    );

    report
}

/// Regular files with a supported extension, sidecars excluded, in name order
fn candidate_files(directory: &Path, config: &ScanConfig) -> Vec<PathBuf> {
    let max_depth = if config.recursive { usize::MAX } else { 1 };
    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    WalkDir::new(directory)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to read directory entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| !is_sidecar(path))
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e.to_lowercase()))
                .unwrap_or(false)
        })
        .collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

async fn classify_file(db: &MetaDb, path: &Path) -> Result<ClassifiedDocument> {
    let filename = file_name_of(path);

    let file_hash = compute_file_hash(path)?;
    let metadata = load_metadata(path)?;
    let existing = db.get_source_by_filename(&filename).await?;
    let queued = match existing {
        Some(_) => db.has_active_queue_entry(&filename).await?,
        None => false,
    };
    let classification = Classification::of(existing.as_ref(), &file_hash, queued);

    Ok(ClassifiedDocument {
        filename,
        path: path.to_path_buf(),
        file_hash,
        metadata,
        classification,
    })
}
