//! Retrieval pipeline: index lifecycle, query-time retrieval and grounded
//! prompt assembly.

pub mod progress;
pub mod prompt;
pub mod retriever;

pub use progress::{ProgressEvent, RebuildSummary};
pub use prompt::{build_prompt, distinct_sources, SYSTEM_PROMPT};
pub use retriever::{IndexStatus, Retriever};
