//! Persistent vector index for docrag chunks, backed by LanceDB.
//!
//! A collection is served from one of two physical tables. Rebuilds write
//! into the idle table and a pointer in the meta table is flipped on
//! publish, so readers never observe a half-built generation.

pub mod index;
pub mod schema;
pub mod store;
pub mod table;

pub use index::VectorIndex;
pub use store::{ActiveGeneration, VectorStore};
