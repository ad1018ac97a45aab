//! Cut point detection for chunking

use serde::{Deserialize, Serialize};

/// Kind of boundary a chunk was cut at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    /// After a sentence terminator
    Sentence,
    /// After a space
    Word,
    /// Exactly at the window size
    Hard,
    /// The window reached the end of the text
    End,
}

/// A chosen cut position (exclusive end of the chunk, in chars)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutPoint {
    pub position: usize,
    pub kind: BreakKind,
}

fn is_sentence_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Choose where the window `[start, window_end)` should end.
///
/// Soft cuts are only accepted strictly past `start + min_offset`.
pub fn find_cut(text: &[char], start: usize, window_end: usize, min_offset: usize) -> CutPoint {
    if window_end >= text.len() {
        return CutPoint {
            position: text.len(),
            kind: BreakKind::End,
        };
    }

    let floor = start + min_offset;

    // Last terminator inside the window that is followed by whitespace
    if let Some(i) = (start..window_end).rev().find(|&i| {
        is_sentence_terminator(text[i])
            && text.get(i + 1).map(|c| c.is_whitespace()).unwrap_or(false)
    }) {
        if i > floor {
            return CutPoint {
                position: i + 1,
                kind: BreakKind::Sentence,
            };
        }
    }

    if let Some(i) = (start..window_end).rev().find(|&i| text[i] == ' ') {
        if i > floor {
            return CutPoint {
                position: i,
                kind: BreakKind::Word,
            };
        }
    }

    CutPoint {
        position: window_end,
        kind: BreakKind::Hard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = chars("One two three. Four five six seven eight");
        let cut = find_cut(&text, 0, 30, 5);
        assert_eq!(cut.kind, BreakKind::Sentence);
        assert_eq!(cut.position, 14);
    }

    #[test]
    fn test_falls_back_to_word_boundary() {
        let text = chars("alpha beta gamma delta epsilon zeta");
        let cut = find_cut(&text, 0, 20, 5);
        assert_eq!(cut.kind, BreakKind::Word);
        assert_eq!(cut.position, 16);
    }

    #[test]
    fn test_boundary_too_early_is_hard_cut() {
        let text = chars("ab. cdefghijklmnopqrstuvwxyz");
        let cut = find_cut(&text, 0, 20, 10);
        assert_eq!(cut.kind, BreakKind::Hard);
        assert_eq!(cut.position, 20);
    }

    #[test]
    fn test_window_reaching_end() {
        let text = chars("short text");
        let cut = find_cut(&text, 0, 100, 10);
        assert_eq!(cut.kind, BreakKind::End);
        assert_eq!(cut.position, text.len());
    }
}
