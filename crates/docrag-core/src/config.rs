//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`,
//! `config.<env>.toml`, `APP_*` env vars and a handful of well-known
//! provider variables (`OPENAI_API_KEY`, `RAG_DATA_DIR`, ...). Provides
//! helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

/// Number of chunk texts sent to the embedder per indexing request.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Environment variables understood for compatibility with the usual
/// OpenAI/RAG tooling, and the settings keys each one feeds. Later entries
/// win, so `OPENAI_PROXY` beats `HTTPS_PROXY` which beats `HTTP_PROXY`.
const WELL_KNOWN_ENV: &[(&str, &[&str])] = &[
    ("RAG_DATA_DIR", &["data.docs_dir"]),
    ("RAG_PERSIST_DIR", &["data.persist_dir"]),
    ("RAG_COLLECTION_NAME", &["data.collection"]),
    ("OPENAI_EMBED_MODEL", &["embedding.model"]),
    ("OPENAI_MODEL", &["llm.model"]),
    ("OPENAI_BASE_URL", &["embedding.endpoint", "llm.endpoint"]),
    ("OPENAI_API_KEY", &["embedding.api_key", "llm.api_key"]),
    ("HTTP_PROXY", &["embedding.proxy", "llm.proxy"]),
    ("HTTPS_PROXY", &["embedding.proxy", "llm.proxy"]),
    ("OPENAI_PROXY", &["embedding.proxy", "llm.proxy"]),
];

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(RagSettings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        figment = merge_well_known_env(figment);

        Ok(Self { figment })
    }

    /// Wraps an already assembled figment, mostly useful for tests and
    /// embedding the pipeline in another application.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Extracts and validates the typed settings tree.
    pub fn settings(&self) -> Result<RagSettings> {
        let settings: RagSettings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

fn merge_well_known_env(figment: Figment) -> Figment {
    WELL_KNOWN_ENV.iter().fold(figment, |figment, (var, keys)| {
        keys.iter().fold(figment, |figment, key| {
            let key: &'static str = *key;
            figment.merge(Env::raw().only(&[*var]).map(move |_| key.into()))
        })
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
}

impl RagSettings {
    pub fn validate(&self) -> Result<()> {
        let collection = self.data.collection.trim();
        if collection.is_empty() {
            return Err(Error::InvalidConfig("data.collection must not be empty".into()));
        }
        if !collection.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            return Err(Error::InvalidConfig(format!(
                "data.collection '{collection}' may only contain letters, digits, '_', '-' and '.'"
            )));
        }
        if self.chunking.max_chars == 0 {
            return Err(Error::InvalidConfig("chunking.max_chars must be greater than 0".into()));
        }
        if self.chunking.overlap >= self.chunking.max_chars {
            warn!(
                overlap = self.chunking.overlap,
                max_chars = self.chunking.max_chars,
                "chunking.overlap is not smaller than chunking.max_chars; chunks will not overlap as configured"
            );
        }
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be greater than 0".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Root directory scanned for `.txt`, `.md` and `.pdf` files.
    pub docs_dir: String,
    /// LanceDB directory holding the collection.
    pub persist_dir: String,
    pub collection: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            docs_dir: "docs".to_string(),
            persist_dir: "chroma".to_string(),
            collection: "docs".to_string(),
        }
    }
}

impl DataSettings {
    pub fn docs_path(&self) -> PathBuf {
        resolve_from_cwd(&self.docs_dir)
    }

    pub fn persist_path(&self) -> PathBuf {
        resolve_from_cwd(&self.persist_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAi,
    Fake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            proxy: None,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingSettings {
    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.api_key.as_deref())
    }

    pub fn proxy(&self) -> Option<&str> {
        non_empty(self.proxy.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Whether a failed index health check may trigger a destructive rebuild.
    pub rebuild_on_check_failure: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5, rebuild_on_check_failure: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            proxy: None,
            timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    pub fn api_key(&self) -> Option<&str> {
        non_empty(self.api_key.as_deref())
    }

    pub fn proxy(&self) -> Option<&str> {
        non_empty(self.proxy.as_deref())
    }
}

fn resolve_from_cwd(p: &str) -> PathBuf {
    match env::current_dir() {
        Ok(base) => resolve_with_base(&base, p),
        Err(_) => expand_path(p),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
