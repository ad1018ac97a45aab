//! Status and source listing commands

use crate::config::Config;
use crate::error::Result;
use crate::meta::{GlobalStats, MetaDb};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub documents_dir: String,
    pub ocr_models: Vec<String>,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        documents_dir: config.documents_dir().display().to_string(),
        ocr_models: config.ocr.models.iter().map(|m| m.name.clone()).collect(),
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 pagewise Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Documents: {}", status.documents_dir);

    println!("\nOCR chain:");
    for (level, model) in status.ocr_models.iter().enumerate() {
        println!("  {}. {}", level + 1, model);
    }

    println!("\nSources: {}", status.db_stats.source_count);
    for (state, count) in &status.db_stats.sources_by_status {
        println!("  {}: {}", state, count);
    }

    println!("\nQueue:");
    if status.db_stats.queue_by_status.is_empty() {
        println!("  (empty)");
    }
    for (state, count) in &status.db_stats.queue_by_status {
        println!("  {}: {}", state, count);
    }

    println!("\nChunks: {}", status.db_stats.chunk_count);
}

/// Source information for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub author: Option<String>,
    pub priority: String,
    pub status: String,
    pub total_pages: i64,
    pub pages_done: usize,
    pub total_chunks: i64,
    pub updated_at: String,
}

/// List all sources with their progress
pub async fn cmd_list_sources(db: &MetaDb) -> Result<Vec<SourceInfo>> {
    info!("Listing sources");

    let sources = db.list_sources().await?;
    let mut result = Vec::with_capacity(sources.len());

    for source in sources {
        let pages_done = db.processed_pages(&source.id).await?.len();
        result.push(SourceInfo {
            id: source.id,
            filename: source.filename,
            title: source.title,
            author: source.author,
            priority: source.priority,
            status: source.processing_status,
            total_pages: source.total_pages,
            pages_done,
            total_chunks: source.total_chunks,
            updated_at: source.updated_at,
        });
    }

    Ok(result)
}

/// Print sources to console
pub fn print_sources(sources: &[SourceInfo]) {
    println!("\n📚 Registered Sources\n");

    if sources.is_empty() {
        println!("No sources registered. Use 'pagewise scan' to add documents.");
        return;
    }

    for source in sources {
        println!("{} [{}]", source.title, source.status);
        println!("  File: {}", source.filename);
        if let Some(author) = &source.author {
            println!("  Author: {}", author);
        }
        println!(
            "  Pages: {}/{}, Chunks: {}, Priority: {}",
            source.pages_done, source.total_pages, source.total_chunks, source.priority
        );
        println!("  Updated: {}", source.updated_at);
        println!();
    }
}
