use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider} request failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index was built with embedder '{indexed}' but the current embedder is '{current}'")]
    EmbedderMismatch { indexed: String, current: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Wraps any displayable storage-layer failure (LanceDB, Arrow).
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// True for failures of an external embedding or language-model call.
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
