//! Embedder implementations and the factory that picks one from settings.

use std::sync::Arc;

use tracing::info;

use docrag_core::config::{EmbeddingProvider, EmbeddingSettings};
use docrag_core::error::Result;

pub mod fake;
pub mod openai;

pub use docrag_core::traits::Embedder;
pub use fake::FakeEmbedder;
pub use openai::OpenAiEmbedder;

/// True when `APP_USE_FAKE_EMBEDDINGS` is `1` or `true`.
pub fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Builds the configured embedder. `APP_USE_FAKE_EMBEDDINGS` overrides the
/// configured provider. A missing API key for the OpenAI provider is a
/// configuration error raised here, before any pipeline work starts.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_forced() || settings.provider == EmbeddingProvider::Fake {
        info!(dim = settings.dimension, "using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(settings.dimension)));
    }
    Ok(Arc::new(OpenAiEmbedder::new(settings)?))
}
