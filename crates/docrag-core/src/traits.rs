use async_trait::async_trait;

use crate::error::{Error, Result};

/// Text-to-vector model. Implementations must return one vector per input,
/// in input order, each of length `dim()`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identity of the model and its configuration. Vectors from
    /// embedders with different ids are not comparable.
    fn embedder_id(&self) -> &str;

    fn dim(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single query text as a batch of one.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| Error::Operation("embedder returned no vector for the query".into()))?;
        if vector.len() != self.dim() {
            return Err(Error::DimensionMismatch { expected: self.dim(), actual: vector.len() });
        }
        Ok(vector)
    }
}
