use std::fmt;

use docrag_vector::VectorIndex;

/// Outcome of a completed rebuild. `index` is already published.
#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub chunk_count: usize,
    pub document_count: usize,
    pub index: VectorIndex,
}

impl RebuildSummary {
    pub fn counts(&self) -> (usize, usize) {
        (self.chunk_count, self.document_count)
    }
}

/// Milestones of a rebuild, in the order they are produced. `Display`
/// renders the human-readable status line.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started { collection: String, root: String },
    NoDocuments { root: String },
    DocumentsLoaded { documents: usize, chunks: usize },
    BatchIndexed { indexed: usize, total: usize },
    Finished(RebuildSummary),
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { collection, root } => {
                write!(f, "Rebuilding collection '{collection}' from {root}...")
            }
            Self::NoDocuments { root } => {
                write!(f, "No documents found in {root}. Add PDFs, .txt, or .md and rebuild.")
            }
            Self::DocumentsLoaded { documents, chunks } => {
                write!(f, "Loaded {documents} documents into {chunks} chunks.")
            }
            Self::BatchIndexed { indexed, total } => write!(f, "Indexed {indexed}/{total} chunks..."),
            Self::Finished(summary) => write!(
                f,
                "Ingested {} chunks from {} files.",
                summary.chunk_count, summary.document_count
            ),
        }
    }
}
