//! Scan command - detect new and changed documents and queue them

use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::queue::enqueue;
use crate::scan::{scan_directory, ClassifiedDocument};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Scan statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub documents_dir: String,
    pub new_docs: Vec<String>,
    pub updated_docs: Vec<String>,
    pub skipped: usize,
    pub enqueued: usize,
    pub chunks_reset: u64,
    pub errors: Vec<String>,
}

fn names(docs: &[ClassifiedDocument]) -> Vec<String> {
    docs.iter().map(|d| d.filename.clone()).collect()
}

/// Scan the documents directory and enqueue everything that needs work
pub async fn cmd_scan(config: &Config, db: &MetaDb) -> Result<ScanStats> {
    let documents_dir = config.documents_dir();
    info!(path = %documents_dir.display(), "Scanning documents");

    let report = scan_directory(db, &documents_dir, &config.scan).await;
    let queued = enqueue(db, &report.to_enqueue()).await;
    let mut errors = report.errors;
    errors.extend(queued.errors);

    Ok(ScanStats {
        documents_dir: documents_dir.display().to_string(),
        new_docs: names(&report.new_docs),
        updated_docs: names(&report.updated_docs),
        skipped: report.skipped,
        enqueued: queued.enqueued,
        chunks_reset: queued.chunks_reset,
        errors,
    })
}

/// Print scan stats to console
pub fn print_scan_stats(stats: &ScanStats) {
    println!("\n🔎 Scan Complete\n");
    println!("Directory: {}", stats.documents_dir);
    println!("New documents: {}", stats.new_docs.len());
    for name in &stats.new_docs {
        println!("  + {}", name);
    }
    println!("Updated documents: {}", stats.updated_docs.len());
    for name in &stats.updated_docs {
        println!("  ~ {}", name);
    }
    println!("Unchanged (skipped): {}", stats.skipped);
    println!("Queued: {}", stats.enqueued);
    if !stats.errors.is_empty() {
        println!("\nErrors ({}):", stats.errors.len());
        for error in &stats.errors {
            println!("  - {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_enqueues_then_skips() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        let db = MetaDb::connect(&config).await.unwrap();

        std::fs::create_dir_all(config.documents_dir()).unwrap();
        std::fs::write(config.documents_dir().join("guide.pdf"), b"%PDF-1.4").unwrap();

        let first = cmd_scan(&config, &db).await.unwrap();
        assert_eq!(first.new_docs, vec!["guide.pdf".to_string()]);
        assert_eq!(first.enqueued, 1);

        // still pending, so the file is unchanged rather than re-queued
        let second = cmd_scan(&config, &db).await.unwrap();
        assert!(second.new_docs.is_empty());
        assert_eq!(second.skipped, 1);
        assert_eq!(second.enqueued, 0);
    }
}
