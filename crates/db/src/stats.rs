//! Aggregate counts for the `stats` operation spec.md §4.5 exposes to the
//! Search Service / health probes. Grounded on the `count_rows`-with-filter
//! idiom already used in `chunks.rs`/`embeddings.rs` rather than fetching
//! full batches to count in Rust.

use std::collections::HashMap;

use sourcelens_core::model::{AnnKey, Language};
use serde::{Deserialize, Serialize};

use crate::connection::ChunkStore;
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStoreStats {
  pub total_files: usize,
  pub total_chunks: usize,
  pub chunks_by_language: HashMap<String, usize>,
  /// Embedded-row count per `(provider, model, dimension)` table name.
  pub embeddings_by_tuple: HashMap<String, usize>,
  /// `total_chunks - embeddings_by_tuple[tuple]` for each known tuple;
  /// chunks still awaiting a vector for that tuple.
  pub pending_by_tuple: HashMap<String, usize>,
}

impl ChunkStore {
  pub async fn stats(&self) -> Result<ChunkStoreStats> {
    let files_table = self.files_table().await?;
    let total_files = files_table.count_rows(None).await?;

    let chunks_table = self.chunks_table().await?;
    let total_chunks = chunks_table.count_rows(None).await?;

    let mut chunks_by_language = HashMap::new();
    for language in ALL_LANGUAGES {
      let count = chunks_table
        .count_rows(Some(format!("language = '{}'", language.as_str())))
        .await?;
      if count > 0 {
        chunks_by_language.insert(language.as_str().to_string(), count);
      }
    }

    let tuple_tables = self.known_embedding_tuples().await?;
    let mut embeddings_by_tuple = HashMap::new();
    let mut pending_by_tuple = HashMap::new();
    for table_name in tuple_tables {
      let table = self.connection.open_table(&table_name).execute().await?;
      let count = table.count_rows(None).await?;
      embeddings_by_tuple.insert(table_name.clone(), count);
      pending_by_tuple.insert(table_name, total_chunks.saturating_sub(count));
    }

    Ok(ChunkStoreStats {
      total_files,
      total_chunks,
      chunks_by_language,
      embeddings_by_tuple,
      pending_by_tuple,
    })
  }

  /// Chunks still missing a vector for `key`, used by the Embedding
  /// Orchestrator to decide whether a backfill pass is needed at all
  /// before pulling candidate ids from the caller.
  pub async fn pending_embedding_count(&self, key: &AnnKey) -> Result<usize> {
    let total = self.chunks_table().await?.count_rows(None).await?;
    let table = self.embedding_table(key).await?;
    let embedded = table.count_rows(None).await?;
    Ok(total.saturating_sub(embedded))
  }
}

const ALL_LANGUAGES: &[Language] = &[
  Language::Rust,
  Language::Python,
  Language::TypeScript,
  Language::Tsx,
  Language::JavaScript,
  Language::Jsx,
  Language::Go,
  Language::Java,
  Language::Kotlin,
  Language::CSharp,
  Language::Cpp,
  Language::C,
  Language::Ruby,
  Language::Php,
  Language::Ocaml,
  Language::Bash,
  Language::Scala,
  Language::Lua,
  Language::Zig,
  Language::Json,
  Language::Yaml,
  Language::Toml,
  Language::Html,
  Language::Css,
  Language::Markdown,
];

#[cfg(test)]
mod tests {
  use super::*;
  use sourcelens_core::model::{Chunk, ChunkType, DistanceMetric};
  use tempfile::TempDir;
  use uuid::Uuid;

  #[tokio::test]
  async fn stats_counts_files_and_chunks_by_language() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();

    let file_id = Uuid::now_v7();
    let code = "fn main() {}".to_string();
    let chunk = Chunk {
      id: Uuid::now_v7(),
      file_id,
      symbol: "main".to_string(),
      start_line: 1,
      end_line: 1,
      kind: ChunkType::Function,
      content_hash: sourcelens_core::compute_content_hash(&code),
      code,
      language: Language::Rust,
    };
    store.add_chunks(&[chunk]).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_chunks, 1);
    assert_eq!(stats.chunks_by_language.get("rust"), Some(&1));
  }

  #[tokio::test]
  async fn pending_embedding_count_reflects_unwritten_vectors() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    let file_id = Uuid::now_v7();
    let code = "fn main() {}".to_string();
    let chunk = Chunk {
      id: Uuid::now_v7(),
      file_id,
      symbol: "main".to_string(),
      start_line: 1,
      end_line: 1,
      kind: ChunkType::Function,
      content_hash: sourcelens_core::compute_content_hash(&code),
      code,
      language: Language::Rust,
    };
    let chunk_id = chunk.id;
    store.add_chunks(&[chunk]).await.unwrap();

    let key = AnnKey {
      provider: "ollama".to_string(),
      model: "qwen3-embedding".to_string(),
      dimension: 4,
      distance: DistanceMetric::Cosine,
    };
    assert_eq!(store.pending_embedding_count(&key).await.unwrap(), 1);

    store.write_embeddings(&key, vec![(chunk_id, vec![0.1, 0.2, 0.3, 0.4])]).await.unwrap();
    assert_eq!(store.pending_embedding_count(&key).await.unwrap(), 0);
  }
}
