//! SQLite schema definition

/// SQL schema for the ingestion database
pub const SCHEMA_SQL: &str = r#"
-- Knowledge sources: one row per distinct document filename
CREATE TABLE IF NOT EXISTS knowledge_sources (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL UNIQUE,
    file_path TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    title TEXT NOT NULL,
    author TEXT,
    publication_year INTEGER,
    isbn TEXT,
    topics_json TEXT NOT NULL DEFAULT '[]',
    priority TEXT NOT NULL DEFAULT 'normal',
    processing_status TEXT NOT NULL DEFAULT 'pending',
    total_pages INTEGER NOT NULL DEFAULT 0,
    total_chunks INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Knowledge chunks: extracted page text split into overlapping spans
CREATE TABLE IF NOT EXISTS knowledge_chunks (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES knowledge_sources(id),
    chunk_index INTEGER NOT NULL,
    page_number INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    chunk_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(source_id, chunk_index)
);

-- Ingestion queue: one row per document awaiting or undergoing processing
CREATE TABLE IF NOT EXISTS ingestion_queue (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 50,
    status TEXT NOT NULL DEFAULT 'queued',
    queued_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    error TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_sources_status ON knowledge_sources(processing_status);
CREATE INDEX IF NOT EXISTS idx_chunks_source_page ON knowledge_chunks(source_id, page_number);
CREATE INDEX IF NOT EXISTS idx_chunks_hash ON knowledge_chunks(chunk_hash);
CREATE INDEX IF NOT EXISTS idx_queue_status ON ingestion_queue(status);
CREATE INDEX IF NOT EXISTS idx_queue_order ON ingestion_queue(priority DESC, queued_at ASC);
CREATE INDEX IF NOT EXISTS idx_queue_filename ON ingestion_queue(filename);
"#;
