//! Metadata storage using SQLite
//!
//! This module handles all persistent ingestion state:
//! - Knowledge sources (one per document filename)
//! - Knowledge chunks (page text split for retrieval)
//! - The ingestion queue (work items with priority and status)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Format a timestamp with fixed width so string order equals time order
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time as a stored timestamp
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// Document priority as declared in metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Lenient parse: anything other than `high`/`low` is normal
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }

    /// Numeric weight used to order the ingestion queue
    pub fn queue_weight(self) -> i64 {
        match self {
            Priority::High => 80,
            Priority::Normal => 50,
            Priority::Low => 30,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Per-document processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            _ => Err(Error::Other(format!("Unknown processing status: {}", s))),
        }
    }
}

/// Queue entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Queued => write!(f, "queued"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(QueueStatus::Queued),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            _ => Err(Error::Other(format!("Unknown queue status: {}", s))),
        }
    }
}

/// A registered source document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    pub file_hash: String,
    pub title: String,
    pub author: Option<String>,
    pub publication_year: Option<i64>,
    pub isbn: Option<String>,
    pub topics_json: String,
    pub priority: String,
    pub processing_status: String,
    pub total_pages: i64,
    pub total_chunks: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl KnowledgeSource {
    pub fn new(filename: String, file_path: String, file_hash: String, title: String) -> Self {
        let now = timestamp_now();
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            file_path,
            file_hash,
            title,
            author: None,
            publication_year: None,
            isbn: None,
            topics_json: "[]".to_string(),
            priority: Priority::Normal.to_string(),
            processing_status: ProcessingStatus::Pending.to_string(),
            total_pages: 0,
            total_chunks: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status(&self) -> Result<ProcessingStatus> {
        self.processing_status.parse()
    }

    pub fn priority(&self) -> Priority {
        Priority::from_label(&self.priority)
    }

    pub fn topics(&self) -> Vec<String> {
        serde_json::from_str(&self.topics_json).unwrap_or_default()
    }

    pub fn set_topics(&mut self, topics: &[String]) {
        self.topics_json = serde_json::to_string(topics).unwrap_or_else(|_| "[]".to_string());
    }
}

/// A persisted chunk of page text
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub page_number: i64,
    pub chunk_text: String,
    pub chunk_hash: String,
    pub created_at: String,
}

impl KnowledgeChunk {
    pub fn new(
        source_id: String,
        chunk_index: i64,
        page_number: i64,
        chunk_text: String,
        chunk_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_id,
            chunk_index,
            page_number,
            chunk_text,
            chunk_hash,
            created_at: timestamp_now(),
        }
    }
}

/// A unit of work in the ingestion queue
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    pub file_hash: String,
    pub priority: i64,
    pub status: String,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

impl QueueEntry {
    pub fn new(filename: String, file_path: String, file_hash: String, priority: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            file_path,
            file_hash,
            priority,
            status: QueueStatus::Queued.to_string(),
            queued_at: timestamp_now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn status(&self) -> Result<QueueStatus> {
        self.status.parse()
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Create database with path directly (without full config)
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        // Auto-initialize schema if needed
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='ingestion_queue'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Source Operations =====

    /// Insert a source, or refresh an existing one with the same filename.
    ///
    /// On conflict the stored id is kept, descriptive fields are replaced and
    /// the status is reset to `pending`. Returns the persisted id.
    pub async fn upsert_source(&self, source: &KnowledgeSource) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        upsert_source_on(&mut conn, source).await
    }

    /// Get source by ID
    pub async fn get_source(&self, id: &str) -> Result<Option<KnowledgeSource>> {
        let source =
            sqlx::query_as::<_, KnowledgeSource>("SELECT * FROM knowledge_sources WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(source)
    }

    /// Get source by filename
    pub async fn get_source_by_filename(&self, filename: &str) -> Result<Option<KnowledgeSource>> {
        let source = sqlx::query_as::<_, KnowledgeSource>(
            "SELECT * FROM knowledge_sources WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    /// List all sources
    pub async fn list_sources(&self) -> Result<Vec<KnowledgeSource>> {
        let sources = sqlx::query_as::<_, KnowledgeSource>(
            "SELECT * FROM knowledge_sources ORDER BY filename",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    /// Set a source's processing status
    pub async fn set_source_status(&self, id: &str, status: ProcessingStatus) -> Result<()> {
        sqlx::query("UPDATE knowledge_sources SET processing_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(timestamp_now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the page count and recount persisted chunks for a source
    pub async fn update_source_counts(&self, id: &str, total_pages: u32) -> Result<i64> {
        let total_chunks = self.count_chunks(id).await?;
        sqlx::query(
            "UPDATE knowledge_sources SET total_pages = ?, total_chunks = ?, updated_at = ? WHERE id = ?",
        )
        .bind(i64::from(total_pages))
        .bind(total_chunks)
        .bind(timestamp_now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(total_chunks)
    }

    // ===== Chunk Operations =====

    /// Persist all chunks of one page atomically
    pub async fn insert_page_chunks(&self, source_id: &str, chunks: &[KnowledgeChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO knowledge_chunks (id, source_id, chunk_index, page_number, chunk_text, chunk_hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(chunk.chunk_index)
            .bind(chunk.page_number)
            .bind(&chunk.chunk_text)
            .bind(&chunk.chunk_hash)
            .bind(&chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE knowledge_sources SET
                total_chunks = (SELECT COUNT(*) FROM knowledge_chunks WHERE source_id = ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(source_id)
        .bind(timestamp_now())
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Reassign a source's chunk indices so they follow page order.
    ///
    /// Indices are first moved to negative values so the unique
    /// `(source_id, chunk_index)` constraint holds while rows are rewritten.
    pub async fn renumber_chunks(&self, source_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE knowledge_chunks SET chunk_index = -1 - chunk_index WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        // negation reversed the order within a page
        sqlx::query(
            r#"
            UPDATE knowledge_chunks SET chunk_index = ordered.new_index
            FROM (
                SELECT id, ROW_NUMBER() OVER (
                    ORDER BY page_number ASC, chunk_index DESC
                ) - 1 AS new_index
                FROM knowledge_chunks
                WHERE source_id = ?
            ) AS ordered
            WHERE knowledge_chunks.id = ordered.id
            "#,
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Page numbers that already have at least one persisted chunk
    pub async fn processed_pages(&self, source_id: &str) -> Result<HashSet<u32>> {
        let pages: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT page_number FROM knowledge_chunks WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pages
            .into_iter()
            .filter_map(|p| u32::try_from(p).ok())
            .collect())
    }

    /// Next free chunk index for a source
    pub async fn next_chunk_index(&self, source_id: &str) -> Result<i64> {
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM knowledge_chunks WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(next)
    }

    /// Count persisted chunks for a source
    pub async fn count_chunks(&self, source_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_chunks WHERE source_id = ?")
                .bind(source_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Get chunks for a source in index order
    pub async fn get_chunks(&self, source_id: &str) -> Result<Vec<KnowledgeChunk>> {
        let chunks = sqlx::query_as::<_, KnowledgeChunk>(
            "SELECT * FROM knowledge_chunks WHERE source_id = ? ORDER BY chunk_index",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    // ===== Queue Operations =====

    /// Insert a queue entry; an existing row with the same id is left untouched
    pub async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        insert_queue_entry_on(&mut conn, entry).await
    }

    /// Register a document and queue it in one transaction.
    ///
    /// Upserts the source, clears its chunks when `reset_chunks` is set and
    /// appends the queue entry. Either all of it is persisted or none of it.
    pub async fn enqueue_document(
        &self,
        source: &KnowledgeSource,
        reset_chunks: bool,
        entry: &QueueEntry,
    ) -> Result<EnqueuedDocument> {
        let mut tx = self.pool.begin().await?;

        let source_id = upsert_source_on(&mut tx, source).await?;
        let chunks_reset = if reset_chunks {
            delete_source_chunks_on(&mut tx, &source_id).await?
        } else {
            0
        };
        let queued = insert_queue_entry_on(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(EnqueuedDocument {
            source_id,
            chunks_reset,
            queued,
        })
    }

    /// Whether a `queued` or `processing` entry exists for a filename
    pub async fn has_active_queue_entry(&self, filename: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM ingestion_queue WHERE filename = ? AND status IN ('queued', 'processing') LIMIT 1",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Get a queue entry by ID
    pub async fn get_queue_entry(&self, id: &str) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>("SELECT * FROM ingestion_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    /// List queue entries for a filename, oldest first
    pub async fn queue_entries_for(&self, filename: &str) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM ingestion_queue WHERE filename = ? ORDER BY queued_at",
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Select entries eligible for a worker to claim, at most one per filename.
    ///
    /// Eligible: `queued`; `processing` with `started_at` before `stale_before`;
    /// `processing` whose source is still `pending` (partial completion).
    /// Among eligible entries for the same file the highest priority, oldest
    /// one is returned.
    pub async fn claimable_entries(
        &self,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            SELECT * FROM (
                SELECT q.*, ROW_NUMBER() OVER (
                    PARTITION BY q.filename ORDER BY q.priority DESC, q.queued_at ASC
                ) AS claim_rank
                FROM ingestion_queue q
                LEFT JOIN knowledge_sources s ON s.filename = q.filename
                WHERE q.status = 'queued'
                   OR (q.status = 'processing' AND (q.started_at IS NULL OR q.started_at < ?))
                   OR (q.status = 'processing' AND s.processing_status = 'pending')
            )
            WHERE claim_rank = 1
            ORDER BY priority DESC, queued_at ASC
            LIMIT ?
            "#,
        )
        .bind(format_timestamp(stale_before))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Close every other active entry for the same file.
    ///
    /// The claimed entry works from the source's page checkpoint, so the
    /// siblings carry no extra work. Returns how many were closed.
    pub async fn supersede_queue_siblings(&self, filename: &str, keep_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingestion_queue
            SET status = 'completed', completed_at = ?, error = ?
            WHERE filename = ? AND id != ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(timestamp_now())
        .bind(format!("superseded by {}", keep_id))
        .bind(filename)
        .bind(keep_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Claim an entry: mark it `processing` and refresh `started_at`
    pub async fn mark_queue_processing(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingestion_queue SET status = 'processing', started_at = ?, completed_at = NULL WHERE id = ?",
        )
        .bind(timestamp_now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Leave an entry at `processing` for a later resume, recording why
    pub async fn mark_queue_resumable(&self, id: &str, error: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE ingestion_queue SET status = 'processing', completed_at = NULL, error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark an entry completed
    pub async fn mark_queue_completed(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingestion_queue SET status = 'completed', completed_at = ?, error = NULL WHERE id = ?",
        )
        .bind(timestamp_now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark an entry failed
    pub async fn mark_queue_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingestion_queue SET status = 'failed', completed_at = ?, error = ? WHERE id = ?",
        )
        .bind(timestamp_now())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite an entry's `started_at` (used to age claims)
    pub async fn set_queue_started_at(&self, id: &str, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE ingestion_queue SET started_at = ? WHERE id = ?")
            .bind(format_timestamp(started_at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let sources_by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT processing_status, COUNT(*) FROM knowledge_sources GROUP BY processing_status",
        )
        .fetch_all(&self.pool)
        .await?;

        let queue_by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM ingestion_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_chunks")
            .fetch_one(&self.pool)
            .await?;

        let sources_by_status: BTreeMap<String, i64> = sources_by_status.into_iter().collect();
        let queue_by_status: BTreeMap<String, i64> = queue_by_status.into_iter().collect();

        Ok(GlobalStats {
            source_count: sources_by_status.values().sum(),
            sources_by_status,
            queue_by_status,
            chunk_count,
        })
    }
}

/// What [`MetaDb::enqueue_document`] persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedDocument {
    pub source_id: String,
    pub chunks_reset: u64,
    /// False when an entry with the same id already existed
    pub queued: bool,
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub source_count: i64,
    pub sources_by_status: BTreeMap<String, i64>,
    pub queue_by_status: BTreeMap<String, i64>,
    pub chunk_count: i64,
}

async fn upsert_source_on(conn: &mut SqliteConnection, source: &KnowledgeSource) -> Result<String> {
    let id: String = sqlx::query_scalar(
        r#"
        INSERT INTO knowledge_sources (
            id, filename, file_path, file_hash, title, author, publication_year, isbn,
            topics_json, priority, processing_status, total_pages, total_chunks,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, 0, ?, ?)
        ON CONFLICT(filename) DO UPDATE SET
            file_path = excluded.file_path,
            file_hash = excluded.file_hash,
            title = excluded.title,
            author = excluded.author,
            publication_year = excluded.publication_year,
            isbn = excluded.isbn,
            topics_json = excluded.topics_json,
            priority = excluded.priority,
            processing_status = 'pending',
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(&source.id)
    .bind(&source.filename)
    .bind(&source.file_path)
    .bind(&source.file_hash)
    .bind(&source.title)
    .bind(&source.author)
    .bind(source.publication_year)
    .bind(&source.isbn)
    .bind(&source.topics_json)
    .bind(&source.priority)
    .bind(&source.created_at)
    .bind(&source.updated_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Delete all chunks for a source, returning how many were removed
async fn delete_source_chunks_on(conn: &mut SqliteConnection, source_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM knowledge_chunks WHERE source_id = ?")
        .bind(source_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE knowledge_sources SET total_chunks = 0, updated_at = ? WHERE id = ?")
        .bind(timestamp_now())
        .bind(source_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

async fn insert_queue_entry_on(conn: &mut SqliteConnection, entry: &QueueEntry) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO ingestion_queue (id, filename, file_path, file_hash, priority, status, queued_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.filename)
    .bind(&entry.file_path)
    .bind(&entry.file_hash)
    .bind(entry.priority)
    .bind(&entry.status)
    .bind(&entry.queued_at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = MetaDb::connect(&config).await.unwrap();
        (db, tmp)
    }

    fn chunk(source_id: &str, index: i64, page: i64) -> KnowledgeChunk {
        KnowledgeChunk::new(
            source_id.to_string(),
            index,
            page,
            format!("text {} on page {}", index, page),
            format!("hash-{}", index),
        )
    }

    #[test]
    fn test_priority_weights() {
        assert_eq!(Priority::from_label("high").queue_weight(), 80);
        assert_eq!(Priority::from_label("LOW").queue_weight(), 30);
        assert_eq!(Priority::from_label("normal").queue_weight(), 50);
        assert_eq!(Priority::from_label("urgent").queue_weight(), 50);
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let earlier = Utc::now();
        let later = earlier + Duration::milliseconds(1);
        assert!(format_timestamp(earlier) < format_timestamp(later));
        assert_eq!(format_timestamp(earlier).len(), format_timestamp(later).len());
    }

    #[tokio::test]
    async fn test_source_upsert_keeps_id_and_resets_status() {
        let (db, _tmp) = setup_test_db().await;

        let mut source = KnowledgeSource::new(
            "book.pdf".to_string(),
            "/docs/book.pdf".to_string(),
            "hash1".to_string(),
            "Book".to_string(),
        );
        source.set_topics(&["physics".to_string()]);
        let id = db.upsert_source(&source).await.unwrap();
        assert_eq!(id, source.id);

        db.set_source_status(&id, ProcessingStatus::Completed).await.unwrap();

        let mut again = KnowledgeSource::new(
            "book.pdf".to_string(),
            "/docs/book.pdf".to_string(),
            "hash2".to_string(),
            "Book, 2nd Edition".to_string(),
        );
        again.priority = Priority::High.to_string();
        let second_id = db.upsert_source(&again).await.unwrap();
        assert_eq!(second_id, id);

        let loaded = db.get_source_by_filename("book.pdf").await.unwrap().unwrap();
        assert_eq!(loaded.file_hash, "hash2");
        assert_eq!(loaded.title, "Book, 2nd Edition");
        assert_eq!(loaded.status().unwrap(), ProcessingStatus::Pending);
        assert_eq!(loaded.priority(), Priority::High);
        assert_eq!(db.list_sources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_page_chunks_and_checkpoint() {
        let (db, _tmp) = setup_test_db().await;

        let source = KnowledgeSource::new(
            "a.pdf".to_string(),
            "/docs/a.pdf".to_string(),
            "h".to_string(),
            "A".to_string(),
        );
        let id = db.upsert_source(&source).await.unwrap();

        assert_eq!(db.next_chunk_index(&id).await.unwrap(), 0);
        assert!(db.processed_pages(&id).await.unwrap().is_empty());

        db.insert_page_chunks(&id, &[chunk(&id, 0, 1), chunk(&id, 1, 1)])
            .await
            .unwrap();
        db.insert_page_chunks(&id, &[chunk(&id, 2, 2)]).await.unwrap();

        let pages = db.processed_pages(&id).await.unwrap();
        assert_eq!(pages, HashSet::from([1, 2]));
        assert_eq!(db.next_chunk_index(&id).await.unwrap(), 3);
        assert_eq!(db.count_chunks(&id).await.unwrap(), 3);

        let loaded = db.get_source(&id).await.unwrap().unwrap();
        assert_eq!(loaded.total_chunks, 3);

        let chunks = db.get_chunks(&id).await.unwrap();
        let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        let entry = QueueEntry::new("a.pdf".into(), "/docs/a.pdf".into(), "h".into(), 50);
        let requeued = db.enqueue_document(&source, true, &entry).await.unwrap();
        assert_eq!(requeued.source_id, id);
        assert_eq!(requeued.chunks_reset, 3);
        assert!(requeued.queued);
        assert_eq!(db.count_chunks(&id).await.unwrap(), 0);
        assert_eq!(db.get_source(&id).await.unwrap().unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_duplicate_chunk_index_rolls_back_page() {
        let (db, _tmp) = setup_test_db().await;

        let source = KnowledgeSource::new(
            "a.pdf".to_string(),
            "/docs/a.pdf".to_string(),
            "h".to_string(),
            "A".to_string(),
        );
        let id = db.upsert_source(&source).await.unwrap();
        db.insert_page_chunks(&id, &[chunk(&id, 0, 1)]).await.unwrap();

        let result = db
            .insert_page_chunks(&id, &[chunk(&id, 1, 2), chunk(&id, 0, 2)])
            .await;
        assert!(result.is_err());
        assert_eq!(db.processed_pages(&id).await.unwrap(), HashSet::from([1]));
    }

    #[tokio::test]
    async fn test_claimable_entries_selection() {
        let (db, _tmp) = setup_test_db().await;

        // completed source with a fresh processing entry: not claimable
        let done = KnowledgeSource::new(
            "done.pdf".to_string(),
            "/d/done.pdf".to_string(),
            "h".to_string(),
            "Done".to_string(),
        );
        let done_id = db.upsert_source(&done).await.unwrap();
        db.set_source_status(&done_id, ProcessingStatus::Completed).await.unwrap();
        let fresh = QueueEntry::new("done.pdf".into(), "/d/done.pdf".into(), "h".into(), 50);
        db.insert_queue_entry(&fresh).await.unwrap();
        db.mark_queue_processing(&fresh.id).await.unwrap();

        // stale processing entry: claimable
        let stale = QueueEntry::new("stale.pdf".into(), "/d/stale.pdf".into(), "h".into(), 30);
        db.insert_queue_entry(&stale).await.unwrap();
        db.mark_queue_processing(&stale.id).await.unwrap();
        db.set_queue_started_at(&stale.id, Utc::now() - Duration::hours(2))
            .await
            .unwrap();

        // queued, high priority: claimable and first
        let high = QueueEntry::new("high.pdf".into(), "/d/high.pdf".into(), "h".into(), 80);
        db.insert_queue_entry(&high).await.unwrap();

        // processing with pending source: claimable
        let partial = KnowledgeSource::new(
            "partial.pdf".to_string(),
            "/d/partial.pdf".to_string(),
            "h".to_string(),
            "Partial".to_string(),
        );
        db.upsert_source(&partial).await.unwrap();
        let resumable = QueueEntry::new("partial.pdf".into(), "/d/partial.pdf".into(), "h".into(), 50);
        db.insert_queue_entry(&resumable).await.unwrap();
        db.mark_queue_processing(&resumable.id).await.unwrap();

        // failed entry: not claimable
        let failed = QueueEntry::new("bad.pdf".into(), "/d/bad.pdf".into(), "h".into(), 80);
        db.insert_queue_entry(&failed).await.unwrap();
        db.mark_queue_failed(&failed.id, "boom").await.unwrap();

        let cutoff = Utc::now() - Duration::minutes(30);
        let claimable = db.claimable_entries(cutoff, 10).await.unwrap();
        let names: Vec<&str> = claimable.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["high.pdf", "partial.pdf", "stale.pdf"]);

        let limited = db.claimable_entries(cutoff, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].filename, "high.pdf");
    }

    #[tokio::test]
    async fn test_queue_insert_is_idempotent_by_id() {
        let (db, _tmp) = setup_test_db().await;

        let entry = QueueEntry::new("a.pdf".into(), "/d/a.pdf".into(), "h".into(), 50);
        assert!(db.insert_queue_entry(&entry).await.unwrap());
        assert!(!db.insert_queue_entry(&entry).await.unwrap());
        assert_eq!(db.queue_entries_for("a.pdf").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_global_stats() {
        let (db, _tmp) = setup_test_db().await;

        let source = KnowledgeSource::new(
            "a.pdf".to_string(),
            "/docs/a.pdf".to_string(),
            "h".to_string(),
            "A".to_string(),
        );
        let id = db.upsert_source(&source).await.unwrap();
        db.insert_page_chunks(&id, &[chunk(&id, 0, 1)]).await.unwrap();
        let entry = QueueEntry::new("a.pdf".into(), "/docs/a.pdf".into(), "h".into(), 50);
        db.insert_queue_entry(&entry).await.unwrap();

        let stats = db.get_global_stats().await.unwrap();
        assert_eq!(stats.source_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.sources_by_status.get("pending"), Some(&1));
        assert_eq!(stats.queue_by_status.get("queued"), Some(&1));
    }
}
