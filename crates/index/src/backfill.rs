//! `PendingChunkSource`/`VectorSink` implementations over the Chunk Store
//! (spec.md §4.4's "pending set"). The Chunk Store itself doubles as the
//! pending-embedding set: any committed chunk missing a row in a tuple's
//! embedding table is, by definition, pending for that tuple, so there is
//! no separate queue to maintain in parallel with the database.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sourcelens_core::model::AnnKey;
use sourcelens_db::ChunkStore;
use sourcelens_embedding::{OrchestratorError, PendingChunk, PendingChunkSource, VectorSink};
use uuid::Uuid;

/// Supplies chunks still missing a vector for one `(provider, model,
/// dimension)` tuple. Re-scans `files`/`chunks` on every call rather than
/// keeping its own cursor — correct for the single-project, single-writer
/// scope this system targets (spec.md's non-goal on distributed/multi-writer
/// operation), at the cost of re-walking all files per backfill batch.
pub struct ChunkStoreSource {
  store: Arc<ChunkStore>,
  key: AnnKey,
}

impl ChunkStoreSource {
  pub fn new(store: Arc<ChunkStore>, key: AnnKey) -> Self {
    Self { store, key }
  }
}

#[async_trait]
impl PendingChunkSource for ChunkStoreSource {
  async fn next_batch(&self, limit: usize) -> std::result::Result<Vec<PendingChunk>, OrchestratorError> {
    let files = self
      .store
      .list_files()
      .await
      .map_err(|err| OrchestratorError::Source(err.to_string()))?;

    let mut batch = Vec::new();
    for file in files {
      if batch.len() >= limit {
        break;
      }
      let chunks = self
        .store
        .get_chunks_for_file_id(file.id)
        .await
        .map_err(|err| OrchestratorError::Source(err.to_string()))?;
      if chunks.is_empty() {
        continue;
      }

      let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
      let missing = self
        .store
        .missing_embeddings(&self.key, &ids)
        .await
        .map_err(|err| OrchestratorError::Source(err.to_string()))?;
      if missing.is_empty() {
        continue;
      }
      let missing: HashSet<Uuid> = missing.into_iter().collect();

      for chunk in chunks {
        if missing.contains(&chunk.id) {
          batch.push(PendingChunk {
            chunk_id: chunk.id,
            text: chunk.code,
          });
          if batch.len() >= limit {
            break;
          }
        }
      }
    }
    Ok(batch)
  }
}

/// Writes a completed batch of vectors for one tuple in the single
/// transaction spec.md §4.4 mandates — `ChunkStore::write_embeddings`
/// itself enforces the single-`.add()`-call discipline.
pub struct ChunkStoreSink {
  store: Arc<ChunkStore>,
  key: AnnKey,
}

impl ChunkStoreSink {
  pub fn new(store: Arc<ChunkStore>, key: AnnKey) -> Self {
    Self { store, key }
  }
}

#[async_trait]
impl VectorSink for ChunkStoreSink {
  async fn write_batch(&self, rows: Vec<(Uuid, Vec<f32>)>) -> std::result::Result<(), OrchestratorError> {
    self
      .store
      .write_embeddings(&self.key, rows)
      .await
      .map_err(|err| OrchestratorError::Sink(err.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sourcelens_core::model::{Chunk, ChunkType, DistanceMetric, Language};
  use tempfile::TempDir;

  fn test_key() -> AnnKey {
    AnnKey {
      provider: "ollama".to_string(),
      model: "qwen3-embedding".to_string(),
      dimension: 4,
      distance: DistanceMetric::Cosine,
    }
  }

  #[tokio::test]
  async fn source_surfaces_chunks_missing_the_tuples_vector() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(ChunkStore::open(temp.path().join("t.lance")).await.unwrap());
    let file_id = Uuid::now_v7();
    let file = sourcelens_core::model::File {
      id: file_id,
      path: "src/main.rs".to_string(),
      language: Language::Rust,
      mtime: chrono::Utc::now(),
      content_hash: "abc".to_string(),
    };
    store.upsert_file(&file).await.unwrap();

    let code = "fn main() {}".to_string();
    let chunk = Chunk {
      id: Uuid::now_v7(),
      file_id,
      symbol: "main".to_string(),
      start_line: 1,
      end_line: 1,
      kind: ChunkType::Function,
      content_hash: sourcelens_core::compute_content_hash(&code),
      code: code.clone(),
      language: Language::Rust,
    };
    let chunk_id = chunk.id;
    store.add_chunks(&[chunk]).await.unwrap();

    let key = test_key();
    let source = ChunkStoreSource::new(store.clone(), key.clone());
    let batch = source.next_batch(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].chunk_id, chunk_id);
    assert_eq!(batch[0].text, code);

    let sink = ChunkStoreSink::new(store.clone(), key.clone());
    sink.write_batch(vec![(chunk_id, vec![0.1, 0.2, 0.3, 0.4])]).await.unwrap();

    let drained = source.next_batch(10).await.unwrap();
    assert!(drained.is_empty());
  }
}
