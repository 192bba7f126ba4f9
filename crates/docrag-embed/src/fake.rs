use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use docrag_core::error::Result;
use docrag_core::traits::Embedder;

/// Offline embedder: hashed bag of lowercase words, L2-normalized.
///
/// Texts sharing words land close together, which is enough for tests and
/// for exercising the pipeline without network access.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("fake:xxhash64:{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            let weight = 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += weight;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-6 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            // No tokens: fall back to a fixed unit vector so cosine distance stays defined.
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
