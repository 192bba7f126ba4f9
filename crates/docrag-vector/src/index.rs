use arrow_array::RecordBatchIterator;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::fmt;
use tracing::debug;

use docrag_core::error::{Error, Result};
use docrag_core::types::{Chunk, Hit};

use crate::schema::{chunks_to_record_batch, hits_from_batch};
use crate::store::ActiveGeneration;

/// Handle to one generation of a collection. Cheap to clone; a handle keeps
/// pointing at its own generation after a newer one is published.
#[derive(Clone)]
pub struct VectorIndex {
    table: Table,
    info: ActiveGeneration,
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex").field("info", &self.info).finish_non_exhaustive()
    }
}

impl VectorIndex {
    pub(crate) fn new(table: Table, info: ActiveGeneration) -> Self {
        Self { table, info }
    }

    pub fn info(&self) -> &ActiveGeneration {
        &self.info
    }

    pub fn generation(&self) -> u64 {
        self.info.generation
    }

    pub fn table_name(&self) -> &str {
        &self.info.table
    }

    pub fn dim(&self) -> usize {
        self.info.dim
    }

    pub fn embedder_id(&self) -> &str {
        &self.info.embedder_id
    }

    /// Appends chunks. Ids are trusted to be unique; nothing is de-duplicated.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = chunks_to_record_batch(chunks, self.info.dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table.add(reader).execute().await.map_err(Error::storage)?;
        debug!(table = %self.info.table, rows = chunks.len(), "appended chunks");
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        self.table.count_rows(None).await.map_err(Error::storage)
    }

    /// Up to `k` nearest chunks by cosine distance, closest first. Equal
    /// distances are ordered by source path, then chunk index.
    pub async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<Hit>> {
        if embedding.len() != self.info.dim {
            return Err(Error::DimensionMismatch { expected: self.info.dim, actual: embedding.len() });
        }
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self
            .table
            .vector_search(embedding.to_vec())
            .map_err(Error::storage)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(Error::storage)?;

        let mut hits = Vec::with_capacity(k);
        while let Some(batch) = stream.try_next().await.map_err(Error::storage)? {
            hits.extend(hits_from_batch(&batch)?);
        }
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.metadata.source_path.cmp(&b.metadata.source_path))
                .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        hits.truncate(k);
        Ok(hits)
    }
}
