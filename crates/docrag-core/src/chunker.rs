//! Sliding-window text chunker that prefers to cut on whitespace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Document, TextChunk};

pub const DEFAULT_MAX_CHARS: usize = 1500;
pub const DEFAULT_OVERLAP: usize = 200;

/// A whitespace cut that would leave a chunk shorter than this share of
/// `max_chars` is rejected in favour of a hard cut at the window edge.
const MIN_FILL_RATIO: f64 = 0.6;

/// Window width and overlap, both counted in characters (Unicode scalar
/// values, not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: DEFAULT_MAX_CHARS, overlap: DEFAULT_OVERLAP }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.max_chars == 0 {
            return Err(Error::InvalidConfig("chunking.max_chars must be greater than 0".into()));
        }
        Ok(Self { config })
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.config.max_chars, self.config.overlap)
    }

    /// Cuts a document into chunks numbered from 0, each with a fresh id.
    pub fn split_document(&self, doc: &Document) -> Vec<TextChunk> {
        self.chunk(&doc.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| TextChunk {
                id: Uuid::new_v4().to_string(),
                source_path: doc.path.clone(),
                chunk_index,
                text,
            })
            .collect()
    }
}

/// Splits `text` into trimmed, non-empty chunks of at most `max_chars`
/// characters.
///
/// Each window ends at its last whitespace character unless that would
/// leave the chunk under 60% of `max_chars`, in which case the window is cut
/// hard at its right edge. The next window starts `overlap` characters
/// before the previous cut, but always strictly after the previous start,
/// so the loop terminates even when `overlap >= max_chars`.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut chunks = Vec::new();
    if n == 0 || max_chars == 0 {
        return chunks;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let min_fill = (max_chars as f64 * MIN_FILL_RATIO) as usize;

    let mut start = 0;
    while start < n {
        let end = (start + max_chars).min(n);
        let cut = match chars[start..end].iter().rposition(|c| c.is_whitespace()) {
            Some(offset) if offset > 0 && offset >= min_fill => start + offset,
            _ => end,
        };

        let piece: String = chars[start..cut].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if cut == n {
            break;
        }
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }
    chunks
}
