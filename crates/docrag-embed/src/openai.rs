//! OpenAI-compatible embeddings client.
//!
//! - POST {endpoint}/v1/embeddings with `{model, input: [...]}`
//! - bearer auth, optional proxy, request timeout from settings
//! - no retry: any failure is returned to the caller as `Error::Provider`

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use docrag_core::config::EmbeddingSettings;
use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;

const PROVIDER: &str = "OpenAI embeddings";
const SNIPPET_LEN: usize = 300;

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dim: usize,
    id: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings.api_key().ok_or_else(|| {
            Error::InvalidConfig(
                "OPENAI_API_KEY is not set; configure embedding.api_key or use embedding.provider = \"fake\"".into(),
            )
        })?;
        let client = build_client(api_key, settings.proxy(), settings.timeout_secs)?;
        let url = embeddings_url(&settings.endpoint)?;
        Ok(Self {
            client,
            url,
            model: settings.model.clone(),
            dim: settings.dimension,
            id: format!("openai:{}:{}", settings.model, settings.dimension),
        })
    }
}

/// Shared reqwest client setup: bearer auth, JSON content type, timeout and
/// an optional proxy for every scheme.
pub fn build_client(api_key: &str, proxy: Option<&str>, timeout_secs: u64) -> Result<reqwest::Client> {
    let mut headers = header::HeaderMap::new();
    let auth = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|e| Error::InvalidConfig(format!("invalid API key header: {e}")))?;
    headers.insert(header::AUTHORIZATION, auth);
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .default_headers(headers);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| Error::InvalidConfig(format!("invalid proxy '{proxy}': {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))
}

fn embeddings_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(Error::InvalidConfig(format!("embedding.endpoint must be http(s): '{endpoint}'")));
    }
    Ok(format!("{}/v1/embeddings", endpoint.trim_end_matches('/')))
}

/// Truncates a response body for error messages.
pub fn make_snippet(text: &str) -> String {
    let mut snippet: String = text.chars().take(SNIPPET_LEN).collect();
    if text.chars().count() > SNIPPET_LEN {
        snippet.push('…');
    }
    snippet
}

/// Decodes an embeddings response body, restoring input order from each
/// item's `index` and checking count and dimension.
fn parse_embeddings(body: &str, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    let out: EmbeddingsResponse = serde_json::from_str(body).map_err(|e| {
        Error::provider(PROVIDER, format!("undecodable response: {e}; expected `data[].embedding`"))
    })?;
    if out.data.len() != expected {
        return Err(Error::provider(
            PROVIDER,
            format!("expected {expected} embeddings, received {}", out.data.len()),
        ));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in out.data {
        if item.embedding.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: item.embedding.len() });
        }
        let index = item.index;
        match slots.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(item.embedding),
            _ => {
                return Err(Error::provider(
                    PROVIDER,
                    format!("response index {index} is out of range or repeated"),
                ))
            }
        }
    }
    Ok(slots.into_iter().flatten().collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        debug!(model = %self.model, inputs = texts.len(), "POST {}", self.url);

        let body = EmbeddingsRequest { model: &self.model, input: texts };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("transport error: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("failed to read response body: {e}")))?;
        if !status.is_success() {
            let snippet = make_snippet(&text);
            error!(
                %status,
                url = %self.url,
                %snippet,
                model = %self.model,
                latency_ms = started.elapsed().as_millis(),
                "embeddings endpoint returned non-success status"
            );
            return Err(Error::provider(PROVIDER, format!("HTTP {status}: {snippet}")));
        }

        let vectors = parse_embeddings(&text, texts.len(), self.dim)?;
        debug!(
            model = %self.model,
            inputs = texts.len(),
            latency_ms = started.elapsed().as_millis(),
            "embeddings completed"
        );
        Ok(vectors)
    }
}
