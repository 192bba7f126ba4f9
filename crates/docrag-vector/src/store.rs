use lancedb::database::CreateTableMode;
use lancedb::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use docrag_core::error::{Error, Result};

use crate::index::VectorIndex;
use crate::schema::build_chunk_schema;
use crate::table::{get_meta, open_db, set_meta};

pub const META_TABLE: &str = "docrag_meta";

/// The published generation of a collection, stored as JSON in the meta
/// table under `active:<collection>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveGeneration {
    pub generation: u64,
    pub table: String,
    pub embedder_id: String,
    pub dim: usize,
}

/// Physical table backing `generation`. Consecutive generations alternate
/// between two slots so a rebuild never touches the live table.
pub fn slot_table_name(collection: &str, generation: u64) -> String {
    let slot = if generation % 2 == 1 { "a" } else { "b" };
    format!("{collection}__{slot}")
}

/// Owns the LanceDB connection for one named collection.
#[derive(Clone)]
pub struct VectorStore {
    conn: Connection,
    collection: String,
}

impl VectorStore {
    pub async fn open(persist_dir: &Path, collection: &str) -> Result<Self> {
        fs::create_dir_all(persist_dir)
            .map_err(|source| Error::Io { path: persist_dir.to_path_buf(), source })?;
        let conn = open_db(&persist_dir.to_string_lossy()).await?;
        Ok(Self { conn, collection: collection.to_string() })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn pointer_key(&self) -> String {
        format!("active:{}", self.collection)
    }

    pub async fn active_generation(&self) -> Result<Option<ActiveGeneration>> {
        let Some(raw) = get_meta(&self.conn, META_TABLE, &self.pointer_key()).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::Storage(format!("corrupt generation pointer for '{}': {e}", self.collection)))
    }

    /// Handle to the published generation, or `None` if the collection has
    /// never been built.
    pub async fn active(&self) -> Result<Option<VectorIndex>> {
        let Some(info) = self.active_generation().await? else {
            return Ok(None);
        };
        let table = self.conn.open_table(&info.table).execute().await.map_err(Error::storage)?;
        Ok(Some(VectorIndex::new(table, info)))
    }

    /// Creates an empty, unpublished table for the next generation, replacing
    /// whatever a previous generation left in that slot. The live generation
    /// keeps serving until `publish` is called with the returned handle.
    pub async fn rebuild(&self, dim: usize, embedder_id: &str) -> Result<VectorIndex> {
        let generation = match self.active_generation().await {
            Ok(current) => current.map_or(1, |g| g.generation + 1),
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "ignoring unreadable generation pointer");
                1
            }
        };
        let table_name = slot_table_name(&self.collection, generation);
        let table = self
            .conn
            .create_empty_table(&table_name, build_chunk_schema(dim)?)
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await
            .map_err(Error::storage)?;
        info!(collection = %self.collection, generation, table = %table_name, dim, "created empty generation");
        Ok(VectorIndex::new(
            table,
            ActiveGeneration { generation, table: table_name, embedder_id: embedder_id.to_string(), dim },
        ))
    }

    /// Makes `index` the generation served by `active`.
    pub async fn publish(&self, index: &VectorIndex) -> Result<()> {
        let value = serde_json::to_string(index.info())
            .map_err(|e| Error::Storage(format!("failed to encode generation pointer: {e}")))?;
        set_meta(&self.conn, META_TABLE, &self.pointer_key(), &value).await?;
        info!(
            collection = %self.collection,
            generation = index.generation(),
            table = %index.table_name(),
            "published generation"
        );
        Ok(())
    }
}
