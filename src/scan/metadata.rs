//! Sidecar metadata loading
//!
//! A document `book.pdf` may be described by `book.meta.json` next to it.
//! Every field is optional; without a sidecar the title comes from the filename.

use crate::error::{Error, Result};
use crate::meta::Priority;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix that replaces a document's extension to form its sidecar name
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Raw sidecar contents
#[derive(Debug, Clone, Default, Deserialize)]
struct Sidecar {
    title: Option<String>,
    author: Option<String>,
    year: Option<i64>,
    isbn: Option<String>,
    topics: Option<Vec<String>>,
    priority: Option<String>,
}

/// Descriptive metadata for a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: Option<String>,
    pub publication_year: Option<i64>,
    pub isbn: Option<String>,
    pub topics: Vec<String>,
    pub priority: Priority,
}

impl DocumentMetadata {
    /// Metadata with only a filename-derived title
    pub fn from_filename(path: &Path) -> Self {
        Self {
            title: title_from_filename(path),
            author: None,
            publication_year: None,
            isbn: None,
            topics: Vec::new(),
            priority: Priority::Normal,
        }
    }
}

/// Whether a path names a sidecar file rather than a document
pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase().ends_with(SIDECAR_SUFFIX))
        .unwrap_or(false)
}

/// Sidecar path for a document (`dir/book.pdf` -> `dir/book.meta.json`)
pub fn sidecar_path(document: &Path) -> PathBuf {
    let stem = document
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    document.with_file_name(format!("{}{}", stem, SIDECAR_SUFFIX))
}

/// Load metadata for a document, falling back to a filename-derived title.
///
/// A sidecar that exists but cannot be read or parsed is an error.
pub fn load_metadata(document: &Path) -> Result<DocumentMetadata> {
    let sidecar = sidecar_path(document);
    let mut metadata = DocumentMetadata::from_filename(document);

    if !sidecar.is_file() {
        return Ok(metadata);
    }

    debug!(path = %sidecar.display(), "Reading metadata sidecar");
    let content = std::fs::read_to_string(&sidecar)?;
    let parsed: Sidecar = serde_json::from_str(&content).map_err(|e| Error::Metadata {
        path: sidecar.display().to_string(),
        reason: e.to_string(),
    })?;

    if let Some(title) = parsed.title.filter(|t| !t.trim().is_empty()) {
        metadata.title = title.trim().to_string();
    }
    metadata.author = parsed.author;
    metadata.publication_year = parsed.year;
    metadata.isbn = parsed.isbn;
    metadata.topics = parsed.topics.unwrap_or_default();
    metadata.priority = parsed
        .priority
        .as_deref()
        .map(Priority::from_label)
        .unwrap_or_default();

    Ok(metadata)
}

/// Derive a readable title: separators become spaces, words are title-cased
pub fn title_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    stem.split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
