//! Separator-aware, overlapping text chunker.
//!
//! Splits normalized document text into [`Passage`]s of at most
//! `chunk_size` characters. Each chunk breaks at the highest-priority
//! separator available inside its window, and consecutive chunks share
//! `overlap` characters so that context spanning a boundary is retrievable
//! from either side.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `chunk_size` chars, it is the last chunk.
//! 2. Otherwise, for each separator in priority order, find its **last**
//!    occurrence in the window `[pos, pos + chunk_size)` whose break point
//!    (just after the separator) leaves a chunk longer than `overlap`.
//! 3. The empty separator means a hard cut at `chunk_size`.
//! 4. If nothing matches and there is no empty separator, the chunk runs
//!    to the next separator occurrence (or end of text), exceeding
//!    `chunk_size`. This is the only way a chunk can be oversized.
//! 5. The next chunk starts `overlap` chars before the previous end.
//!
//! Offsets are in chars, so multi-byte text never splits inside a code point.
//!
//! # Example
//!
//! ```rust
//! use passage_retrieval::chunk::Chunker;
//!
//! let chunker = Chunker::new(12, 4, vec![" ".into(), "".into()]);
//! let chunks = chunker.split("alpha beta gamma delta");
//! assert_eq!(chunks[0].text, "alpha beta ");
//! assert_eq!(chunks[1].start, chunks[0].end - 4);
//! ```

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Metadata, Passage};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 750;

/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 100;

/// Separator priority: paragraph, line, sentence terminators, comma, space,
/// and finally the empty separator (hard character cut).
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ".", "!", "?", ",", " ", ""]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// A chunk of text with its char offsets in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    /// Inclusive start offset, in chars.
    pub start: usize,
    /// Exclusive end offset, in chars.
    pub end: usize,
    pub text: String,
}

/// Configured splitter. Cheap to clone and reuse across documents.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<Vec<char>>,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, default_separators())
    }
}

impl Chunker {
    /// Create a chunker.
    ///
    /// `chunk_size` is raised to at least 1 and `overlap` is clamped below
    /// `chunk_size` so that every step makes progress.
    pub fn new(chunk_size: usize, overlap: usize, separators: Vec<String>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            separators: separators.iter().map(|s| s.chars().collect()).collect(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(
            config.chunk_size,
            config.overlap,
            config.separators.clone(),
        )
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping chunks. Empty text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut pos = 0;

        while pos < len {
            let end = if len - pos <= self.chunk_size {
                len
            } else {
                self.break_point(&chars, pos)
            };

            chunks.push(TextChunk {
                index: chunks.len(),
                start: pos,
                end,
                text: chars[pos..end].iter().collect(),
            });

            if end >= len {
                break;
            }
            pos = end.saturating_sub(self.overlap).max(pos + 1);
        }

        chunks
    }

    /// End offset for a chunk starting at `pos` when the remainder does not fit.
    fn break_point(&self, chars: &[char], pos: usize) -> usize {
        let window = &chars[pos..pos + self.chunk_size];
        let min_len = self.overlap + 1;

        for sep in &self.separators {
            if sep.is_empty() {
                return pos + self.chunk_size;
            }
            if let Some(len) = last_break(window, sep, min_len) {
                return pos + len;
            }
        }

        self.next_separator_end(chars, pos + self.chunk_size + 1)
    }

    /// First break point at or after `from` for any non-empty separator.
    fn next_separator_end(&self, chars: &[char], from: usize) -> usize {
        (from..=chars.len())
            .find(|&end| {
                self.separators
                    .iter()
                    .any(|sep| !sep.is_empty() && chars[..end].ends_with(sep))
            })
            .unwrap_or(chars.len())
    }
}

/// Longest prefix length of `window` that ends with `sep` and is at least `min_len`.
fn last_break(window: &[char], sep: &[char], min_len: usize) -> Option<usize> {
    if sep.len() > window.len() {
        return None;
    }
    (min_len.max(sep.len())..=window.len())
        .rev()
        .find(|&end| window[..end].ends_with(sep))
}

/// Chunk one normalized document into passages.
///
/// Every passage inherits the document's full metadata and gets a fresh
/// UUID v4 `source_id`.
pub fn chunk(text: &str, document: &str, metadata: &Metadata, chunker: &Chunker) -> Vec<Passage> {
    chunker
        .split(text)
        .into_iter()
        .map(|c| Passage {
            source_id: Uuid::new_v4().to_string(),
            text: c.text,
            metadata: metadata.clone(),
            document: document.to_string(),
            chunk_index: c.index,
        })
        .collect()
}

/// Rebuild the source text from chunks by dropping each declared overlap.
pub fn reassemble(chunks: &[TextChunk]) -> String {
    let mut out = String::new();
    let mut prev_end: usize = 0;
    for c in chunks {
        let skip = prev_end.saturating_sub(c.start);
        out.extend(c.text.chars().skip(skip));
        prev_end = c.end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn sample_text(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{} is here", i))
            .collect::<Vec<_>>()
            .join(". ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = Chunker::default().split("hello world.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "hello world.");
    }

    #[test]
    fn test_empty_text() {
        assert!(Chunker::default().split("").is_empty());
    }

    #[test]
    fn test_respects_chunk_size() {
        let text = sample_text(200);
        let chunker = Chunker::new(80, 20, default_separators());
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(!c.text.is_empty());
            assert!(c.text.chars().count() <= 80, "oversized chunk: {:?}", c.text);
        }
    }

    #[test]
    fn test_prefers_sentence_break() {
        let text = "first sentence here. second sentence is longer than the rest";
        let chunker = Chunker::new(30, 0, default_separators());
        let chunks = chunker.split(text);
        assert_eq!(chunks[0].text, "first sentence here.");
    }

    #[test]
    fn test_falls_back_to_space() {
        let text = "aaaa bbbb cccc dddd eeee";
        let chunker = Chunker::new(12, 0, default_separators());
        let chunks = chunker.split(text);
        assert_eq!(chunks[0].text, "aaaa bbbb ");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunker = Chunker::new(10, 2, default_separators());
        let chunks = chunker.split(text);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "ijklmnopqr");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_oversized_token_emitted_whole() {
        let text = "tiny supercalifragilisticexpialidocious end";
        let chunker = Chunker::new(10, 0, vec![" ".to_string()]);
        let chunks = chunker.split(text);
        assert_eq!(chunks[0].text, "tiny ");
        assert_eq!(chunks[1].text, "supercalifragilisticexpialidocious ");
        assert!(chunks[1].text.chars().count() > 10);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_overlap_is_exact() {
        let text = sample_text(100);
        let chunker = Chunker::new(60, 15, default_separators());
        let chunks = chunker.split(&text);
        for pair in chunks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert_eq!(a.end - b.start, 15);
            let tail: String = a.text.chars().skip(a.text.chars().count() - 15).collect();
            assert!(b.text.starts_with(&tail));
        }
    }

    #[test]
    fn test_coverage_reconstructs_text() {
        let raw = "Newton formulated the laws of motion! Einstein, later, proposed relativity? \
                   Quantum mechanics followed.\n\nMany physicists contributed over decades.";
        for text in [normalize(raw), sample_text(300), raw.to_string()] {
            for (size, overlap) in [(20, 5), (50, 10), (750, 100), (7, 6)] {
                let chunks = Chunker::new(size, overlap, default_separators()).split(&text);
                assert_eq!(reassemble(&chunks), text, "size={} overlap={}", size, overlap);
            }
        }
    }

    #[test]
    fn test_reassemble_hand_built_chunks() {
        assert_eq!(reassemble(&[]), "");
        let chunks = vec![
            TextChunk {
                index: 0,
                start: 0,
                end: 6,
                text: "abcdef".to_string(),
            },
            TextChunk {
                index: 1,
                start: 4,
                end: 9,
                text: "efghi".to_string(),
            },
        ];
        assert_eq!(reassemble(&chunks), "abcdefghi");
    }

    #[test]
    fn test_indices_contiguous() {
        let chunks = Chunker::new(30, 5, default_separators()).split(&sample_text(80));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐ │ hello world │ └──────────────────┘";
        let chunks = Chunker::new(8, 2, default_separators()).split(text);
        assert!(!chunks.is_empty());
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_overlap_clamped() {
        let chunker = Chunker::new(5, 50, default_separators());
        assert_eq!(chunker.overlap(), 4);
        let chunks = chunker.split("abcdefghijkl");
        assert_eq!(reassemble(&chunks), "abcdefghijkl");
    }

    #[test]
    fn test_passages_inherit_metadata() {
        let meta = Metadata {
            title: Some("Physics".into()),
            date: Some("2020".into()),
            category: None,
        };
        let chunker = Chunker::new(20, 5, default_separators());
        let passages = chunk(&sample_text(10), "Physics_2020.txt", &meta, &chunker);
        assert!(passages.len() > 1);
        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.metadata, meta);
            assert_eq!(p.chunk_index, i);
            assert_eq!(p.document, "Physics_2020.txt");
            assert!(!p.text.is_empty());
        }
        let ids: std::collections::HashSet<_> = passages.iter().map(|p| &p.source_id).collect();
        assert_eq!(ids.len(), passages.len());
    }

    #[test]
    fn test_deterministic_text() {
        let text = sample_text(50);
        let chunker = Chunker::new(40, 10, default_separators());
        let a = chunker.split(&text);
        let b = chunker.split(&text);
        assert_eq!(a, b);
    }
}
