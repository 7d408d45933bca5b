//! Chunk Store connection and table lifecycle, grounded on
//! `crates/backend/src/db/connection.rs`'s `ensure_tables`/structured-log
//! pattern. Only `ChunkStore` holds a write-capable LanceDB connection — the
//! coordinator and orchestrator never touch `lancedb::Table` directly,
//! which is how commit-at-store-only (spec.md §4.4's Persistence rule) is
//! enforced structurally rather than by convention.

use std::path::{Path, PathBuf};

use lancedb::{Connection, connect};
use sourcelens_core::model::AnnKey;
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::{chunks_schema, embedding_table_schema, files_schema};

pub struct ChunkStore {
  pub(crate) connection: Connection,
}

impl ChunkStore {
  /// Open or create the Chunk Store at `db_path`, a `.lance` directory
  /// under the project's data dir.
  pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
    let db_path = db_path.into();
    if let Some(parent) = db_path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    info!(path = %db_path.display(), "opening chunk store");
    let connection = connect(db_path.to_string_lossy().as_ref()).execute().await?;

    let store = Self { connection };
    store.ensure_tables().await?;
    Ok(store)
  }

  async fn ensure_tables(&self) -> Result<()> {
    let table_names = self.connection.table_names().execute().await?;
    debug!(existing_tables = table_names.len(), "checking required tables");

    if !table_names.contains(&"files".to_string()) {
      debug!("creating files table");
      self
        .connection
        .create_empty_table("files", files_schema())
        .execute()
        .await?;
    }

    if !table_names.contains(&"chunks".to_string()) {
      debug!("creating chunks table");
      self
        .connection
        .create_empty_table("chunks", chunks_schema())
        .execute()
        .await?;
    }

    Ok(())
  }

  pub(crate) async fn files_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table("files").execute().await?)
  }

  pub(crate) async fn chunks_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table("chunks").execute().await?)
  }

  /// Open the embedding table for `key`, creating it on first use. A
  /// project accumulates one such table per `(provider, model, dimension)`
  /// tuple it has ever embedded with.
  pub(crate) async fn embedding_table(&self, key: &AnnKey) -> Result<lancedb::Table> {
    let name = key.table_name();
    let table_names = self.connection.table_names().execute().await?;
    if !table_names.contains(&name) {
      debug!(table = %name, "creating embedding table");
      self
        .connection
        .create_empty_table(&name, embedding_table_schema(key.dimension))
        .execute()
        .await?;
    }
    Ok(self.connection.open_table(&name).execute().await?)
  }

  pub async fn known_embedding_tuples(&self) -> Result<Vec<String>> {
    Ok(
      self
        .connection
        .table_names()
        .execute()
        .await?
        .into_iter()
        .filter(|n| n.starts_with("embeddings_"))
        .collect(),
    )
  }
}

pub fn default_db_path(data_dir: &Path) -> PathBuf {
  data_dir.join("chunks.lance")
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[tokio::test]
  async fn open_creates_files_and_chunks_tables() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("test.lance")).await.unwrap();
    let tables = store.connection.table_names().execute().await.unwrap();
    assert!(tables.contains(&"files".to_string()));
    assert!(tables.contains(&"chunks".to_string()));
  }

  #[tokio::test]
  async fn embedding_table_created_on_first_use() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("test.lance")).await.unwrap();
    let key = AnnKey {
      provider: "ollama".to_string(),
      model: "qwen3-embedding".to_string(),
      dimension: 8,
      distance: sourcelens_core::model::DistanceMetric::Cosine,
    };
    store.embedding_table(&key).await.unwrap();
    let tables = store.connection.table_names().execute().await.unwrap();
    assert!(tables.contains(&"embeddings_ollama_qwen3-embedding_8".to_string()));
  }
}
