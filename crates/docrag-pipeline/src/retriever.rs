use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, info, warn};

use docrag_core::chunker::Chunker;
use docrag_core::config::{RagSettings, EMBED_BATCH_SIZE};
use docrag_core::error::{Error, Result};
use docrag_core::loader::DocumentLoader;
use docrag_core::traits::Embedder;
use docrag_core::types::{Chunk, Hit, TextChunk};
use docrag_vector::{VectorIndex, VectorStore};

use crate::progress::{ProgressEvent, RebuildSummary};

/// Result of inspecting the published index without changing it.
#[derive(Debug)]
pub enum IndexStatus {
    /// Published and non-empty; safe to query.
    Ready { index: VectorIndex, chunk_count: usize },
    /// Never built, or built from an empty corpus.
    Empty { index: Option<VectorIndex> },
    /// Built with a different embedder; its vectors cannot be compared with
    /// today's query embeddings.
    Stale { index: VectorIndex, indexed_with: String },
    /// The check itself failed; nothing is known about the index.
    CheckFailed(Error),
}

/// Orchestrates loader, chunker, embedder and vector store for one
/// collection.
pub struct Retriever {
    loader: DocumentLoader,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    rebuild_on_check_failure: bool,
}

struct Pass {
    index: VectorIndex,
    chunks: Vec<TextChunk>,
    indexed: usize,
    documents: usize,
}

enum RebuildStep {
    Start,
    Load,
    Embed(Box<Pass>),
    Publish(Box<Pass>),
    Done,
}

impl Retriever {
    pub fn new(loader: DocumentLoader, chunker: Chunker, embedder: Arc<dyn Embedder>, store: VectorStore) -> Self {
        Self { loader, chunker, embedder, store, rebuild_on_check_failure: false }
    }

    /// Allows `ensure_index` to rebuild when the health check errors out
    /// instead of returning the error.
    pub fn rebuild_on_check_failure(mut self, enabled: bool) -> Self {
        self.rebuild_on_check_failure = enabled;
        self
    }

    pub async fn from_settings(settings: &RagSettings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        let store = VectorStore::open(&settings.data.persist_path(), &settings.data.collection).await?;
        let retriever = Self::new(
            DocumentLoader::new(settings.data.docs_path()),
            Chunker::new(settings.chunking)?,
            embedder,
            store,
        );
        Ok(retriever.rebuild_on_check_failure(settings.retrieval.rebuild_on_check_failure))
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub async fn check_index(&self) -> IndexStatus {
        let index = match self.store.active().await {
            Ok(Some(index)) => index,
            Ok(None) => return IndexStatus::Empty { index: None },
            Err(err) => return IndexStatus::CheckFailed(err),
        };
        if index.embedder_id() != self.embedder.embedder_id() {
            let indexed_with = index.embedder_id().to_string();
            return IndexStatus::Stale { index, indexed_with };
        }
        match index.count().await {
            Ok(0) => IndexStatus::Empty { index: Some(index) },
            Ok(chunk_count) => IndexStatus::Ready { index, chunk_count },
            Err(err) => IndexStatus::CheckFailed(err),
        }
    }

    /// Returns a queryable handle, rebuilding from the document root when the
    /// index is empty or was built with another embedder. A failed check is
    /// returned as an error unless rebuild-on-check-failure is enabled.
    pub async fn ensure_index(&self) -> Result<VectorIndex> {
        match self.check_index().await {
            IndexStatus::Ready { index, chunk_count } => {
                debug!(generation = index.generation(), chunk_count, "index ready");
                Ok(index)
            }
            IndexStatus::Empty { .. } => {
                info!(collection = %self.store.collection(), "index is empty; rebuilding");
                self.rebuild_with_logging().await
            }
            IndexStatus::Stale { indexed_with, .. } => {
                warn!(
                    indexed_with = %indexed_with,
                    current = %self.embedder.embedder_id(),
                    "index was built with another embedder; rebuilding"
                );
                self.rebuild_with_logging().await
            }
            IndexStatus::CheckFailed(err) if self.rebuild_on_check_failure => {
                warn!(error = %err, "index check failed; rebuilding as configured");
                self.rebuild_with_logging().await
            }
            IndexStatus::CheckFailed(err) => Err(err),
        }
    }

    async fn rebuild_with_logging(&self) -> Result<VectorIndex> {
        let summary = self.rebuild_index(|msg| info!("{msg}")).await?;
        Ok(summary.index)
    }

    /// Full rebuild as a lazy stream of progress events; work happens only
    /// while the stream is polled, one embedding batch per event. The new
    /// generation is published right before `Finished`. On error the stream
    /// ends and the previously published generation stays live.
    pub fn rebuild(&self) -> impl Stream<Item = Result<ProgressEvent>> + '_ {
        stream::try_unfold(RebuildStep::Start, move |step| async move {
            let next = match step {
                RebuildStep::Start => {
                    let event = ProgressEvent::Started {
                        collection: self.store.collection().to_string(),
                        root: self.loader.root().display().to_string(),
                    };
                    Some((event, RebuildStep::Load))
                }
                RebuildStep::Load => Some(self.load_pass().await?),
                RebuildStep::Embed(pass) => Some(self.index_batch(pass).await?),
                RebuildStep::Publish(pass) => Some(self.publish_pass(*pass).await?),
                RebuildStep::Done => None,
            };
            Ok::<_, Error>(next)
        })
    }

    /// Drains `rebuild`, handing each status line to `progress`, and returns
    /// the summary of the published generation.
    pub async fn rebuild_index<F>(&self, mut progress: F) -> Result<RebuildSummary>
    where
        F: FnMut(&str),
    {
        let events = self.rebuild();
        futures::pin_mut!(events);
        let mut summary = None;
        while let Some(event) = events.try_next().await? {
            progress(&event.to_string());
            if let ProgressEvent::Finished(done) = event {
                summary = Some(done);
            }
        }
        summary.ok_or_else(|| Error::Operation("rebuild ended without a summary".into()))
    }

    /// Embeds `query` as a batch of one and returns up to `k` nearest chunks.
    /// An empty result is a normal outcome.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str, k: usize) -> Result<Vec<Hit>> {
        if index.embedder_id() != self.embedder.embedder_id() {
            return Err(Error::EmbedderMismatch {
                indexed: index.embedder_id().to_string(),
                current: self.embedder.embedder_id().to_string(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_query(query).await?;
        let hits = index.query(&embedding, k).await?;
        debug!(k, hits = hits.len(), generation = index.generation(), "retrieved");
        Ok(hits)
    }

    async fn load_pass(&self) -> Result<(ProgressEvent, RebuildStep)> {
        let index = self.store.rebuild(self.embedder.dim(), self.embedder.embedder_id()).await?;
        let documents = self.loader.load();
        let chunks: Vec<TextChunk> = documents.iter().flat_map(|d| self.chunker.split_document(d)).collect();
        let pass = Box::new(Pass { index, chunks, indexed: 0, documents: documents.len() });

        if pass.documents == 0 {
            let event = ProgressEvent::NoDocuments { root: self.loader.root().display().to_string() };
            return Ok((event, RebuildStep::Publish(pass)));
        }
        let event = ProgressEvent::DocumentsLoaded { documents: pass.documents, chunks: pass.chunks.len() };
        let next = if pass.chunks.is_empty() { RebuildStep::Publish(pass) } else { RebuildStep::Embed(pass) };
        Ok((event, next))
    }

    async fn index_batch(&self, mut pass: Box<Pass>) -> Result<(ProgressEvent, RebuildStep)> {
        let total = pass.chunks.len();
        let end = (pass.indexed + EMBED_BATCH_SIZE).min(total);
        let batch = &pass.chunks[pass.indexed..end];

        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(Error::provider(
                self.embedder.embedder_id(),
                format!("returned {} vectors for {} texts", vectors.len(), batch.len()),
            ));
        }
        let chunks: Vec<Chunk> = batch.iter().cloned().zip(vectors).map(|(c, v)| c.with_embedding(v)).collect();
        pass.index.add(&chunks).await?;
        pass.indexed = end;
        debug!(indexed = end, total, generation = pass.index.generation(), "indexed batch");

        let event = ProgressEvent::BatchIndexed { indexed: end, total };
        let next = if end == total { RebuildStep::Publish(pass) } else { RebuildStep::Embed(pass) };
        Ok((event, next))
    }

    async fn publish_pass(&self, pass: Pass) -> Result<(ProgressEvent, RebuildStep)> {
        self.store.publish(&pass.index).await?;
        let summary = RebuildSummary {
            chunk_count: pass.chunks.len(),
            document_count: pass.documents,
            index: pass.index,
        };
        info!(
            collection = %self.store.collection(),
            generation = summary.index.generation(),
            chunks = summary.chunk_count,
            documents = summary.document_count,
            "rebuild finished"
        );
        Ok((ProgressEvent::Finished(summary), RebuildStep::Done))
    }
}
