//! Page text chunking
//!
//! Splits the OCR text of a single page into overlapping chunks:
//! - Whitespace is normalized first, so positions are stable
//! - Windows end at a sentence terminator, else a space, else a hard cut
//! - Consecutive chunks share at most `overlap_chars` characters
//! - The window start always moves forward, whatever the input

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::scan::compute_text_hash;
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// A chunk produced from one page, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// Position within the page (0-based)
    pub index: usize,

    /// 1-based page the text came from
    pub page_number: u32,

    /// The chunk text, trimmed
    pub text: String,

    /// Char offset of the window start in the normalized page text
    pub char_start: usize,

    /// Char offset of the window end (exclusive)
    pub char_end: usize,

    /// Boundary the window was cut at
    pub cut: BreakKind,

    /// Blake3 hash of the chunk text
    pub hash: String,
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Collapse whitespace runs to single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    whitespace_re().replace_all(text, " ").trim().to_string()
}

/// Chunk the text of one page
pub fn chunk_page(page_text: &str, page_number: u32, config: &ChunkConfig) -> Vec<ChunkDraft> {
    let normalized = normalize_whitespace(page_text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let text: Vec<char> = normalized.chars().collect();
    let target = config.target_chars.max(1);
    let min_offset = config.min_break_offset();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let window_end = (start + target).min(text.len());
        let cut = find_cut(&text, start, window_end, min_offset);
        let is_last = cut.position >= text.len();

        let chunk_text: String = text[start..cut.position].iter().collect();
        let chunk_text = chunk_text.trim().to_string();

        if !chunk_text.is_empty() && (chunk_text.chars().count() >= config.min_chars || is_last) {
            trace!(page_number, start, end = cut.position, kind = ?cut.kind, "Cut chunk");
            chunks.push(ChunkDraft {
                index: chunks.len(),
                page_number,
                hash: compute_text_hash(&chunk_text),
                text: chunk_text,
                char_start: start,
                char_end: cut.position,
                cut: cut.kind,
            });
        }

        if is_last {
            break;
        }

        let next = cut.position.saturating_sub(config.overlap_chars);
        start = if next <= start { cut.position } else { next };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkConfig {
        ChunkConfig::default()
    }

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence number {} explains one more detail of the topic.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a\n\n b\t\tc  "), "a b c");
        assert_eq!(normalize_whitespace("\n \t"), "");
    }

    #[test]
    fn test_empty_page_has_no_chunks() {
        assert!(chunk_page("   \n  ", 1, &config()).is_empty());
    }

    #[test]
    fn test_short_page_is_single_chunk() {
        let chunks = chunk_page("Too short\nto matter.", 4, &config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Too short to matter.");
        assert_eq!(chunks[0].page_number, 4);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_long_page_cuts_at_sentences() {
        let text = prose(60);
        let chunks = chunk_page(&text, 1, &config());

        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.chars().count() <= 1000);
            assert!(chunk.text.ends_with('.'), "chunk should end at a sentence: {}", chunk.text);
            assert_eq!(chunk.cut, BreakKind::Sentence);
        }
        assert_eq!(chunks.last().unwrap().cut, BreakKind::End);
    }

    #[test]
    fn test_indices_increase_and_overlap_is_bounded() {
        let text = prose(120);
        let cfg = config();
        let chunks = chunk_page(&text, 2, &cfg);

        for pair in chunks.windows(2) {
            assert!(pair[1].index > pair[0].index);
            assert!(pair[1].char_start > pair[0].char_start);
            let overlap = pair[0].char_end.saturating_sub(pair[1].char_start);
            assert!(overlap <= cfg.overlap_chars);
        }
        let normalized_len = normalize_whitespace(&text).chars().count();
        assert_eq!(chunks.last().unwrap().char_end, normalized_len);
    }

    #[test]
    fn test_pathological_text_terminates() {
        let text = "x".repeat(5_000);
        let chunks = chunk_page(&text, 1, &config());

        assert!(!chunks.is_empty());
        assert!(chunks.len() < 100);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
        assert_eq!(chunks[0].cut, BreakKind::Hard);
        assert_eq!(chunks.last().unwrap().char_end, 5_000);
    }

    #[test]
    fn test_start_always_advances_with_large_overlap() {
        let cfg = ChunkConfig {
            target_chars: 10,
            overlap_chars: 9,
            min_chars: 1,
            min_break_ratio: 0.5,
        };
        let chunks = chunk_page("abcdefghijklmnopqrstuvwxyz", 1, &cfg);
        assert!(!chunks.is_empty());
        for pair in chunks.windows(2) {
            assert!(pair[1].char_start > pair[0].char_start);
        }
    }

    #[test]
    fn test_trailing_fragment_is_kept() {
        let cfg = ChunkConfig {
            target_chars: 50,
            overlap_chars: 0,
            min_chars: 30,
            min_break_ratio: 0.5,
        };
        let text = format!("{} tail.", "word ".repeat(10).trim());
        let chunks = chunk_page(&text, 1, &cfg);
        let last = chunks.last().unwrap();
        assert!(last.text.ends_with("tail."));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Über die Größe der Bäume – eine Übersicht. ".repeat(80);
        let chunks = chunk_page(&text, 1, &config());
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = prose(50);
        let first = chunk_page(&text, 3, &config());
        let second = chunk_page(&text, 3, &config());
        assert_eq!(first, second);
        assert_eq!(first[0].hash, compute_text_hash(&first[0].text));
    }
}
