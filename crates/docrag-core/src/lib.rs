//! Shared building blocks for the docrag retrieval pipeline: settings,
//! errors, domain types, the embedder seam, document loading and chunking.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
