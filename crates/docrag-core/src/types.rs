//! Domain types shared by the loader, chunker, vector index and retriever.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Raw text of one source file, produced by the loader and consumed by the
/// chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub text: String,
}

/// A chunk that has been cut from a document but not embedded yet.
///
/// - `id`: random unique identifier, never reused across rebuilds
/// - `source_path`: path of the parent document
/// - `chunk_index`: 0-based position in the parent's chunk sequence
/// - `text`: trimmed, never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: ChunkId,
    pub source_path: String,
    pub chunk_index: usize,
    pub text: String,
}

impl TextChunk {
    pub fn with_embedding(self, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: self.id,
            source_path: self.source_path,
            chunk_index: self.chunk_index,
            text: self.text,
            embedding,
        }
    }
}

/// A chunk ready to be stored: a `TextChunk` plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_path: String,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HitMetadata {
    pub source_path: String,
    pub chunk_index: usize,
}

/// One query result. `distance` is cosine distance, lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub text: String,
    pub metadata: HitMetadata,
    pub distance: f32,
}
