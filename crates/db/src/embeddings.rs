//! Per-`(provider, model, dimension)` embedding table operations: batch
//! write (the single-transaction insert `sourcelens-embedding`'s
//! `VectorSink` trait requires) and vector similarity search. Grounded on
//! `crates/db/src/code.rs::search_code_chunks`'s `vector_search`/`only_if`
//! idiom, split out from `chunks.rs` since it reads from a dynamically
//! named table rather than the fixed `chunks` table.

use arrow_array::{Float32Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use sourcelens_core::model::AnnKey;
use std::sync::Arc;
use uuid::Uuid;

use crate::connection::ChunkStore;
use crate::error::{DbError, Result};
use crate::schema::embedding_table_schema;

impl ChunkStore {
  /// Write a batch of `(chunk_id, vector)` rows for `key` in one call.
  /// Callers (the embedding orchestrator's `VectorSink` implementation)
  /// must not split a logical batch across multiple calls — LanceDB's
  /// `add` is the only commit point, matching spec.md §4.4's "single bulk
  /// insert in one transaction, no partial writes" rule.
  pub async fn write_embeddings(&self, key: &AnnKey, rows: Vec<(Uuid, Vec<f32>)>) -> Result<()> {
    if rows.is_empty() {
      return Ok(());
    }

    for (_, vector) in &rows {
      if vector.len() != key.dimension {
        return Err(DbError::InvalidInput(format!(
          "vector has {} dimensions, expected {}",
          vector.len(),
          key.dimension
        )));
      }
    }

    let table = self.embedding_table(key).await?;
    let batch = rows_to_batch(key, &rows)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], embedding_table_schema(key.dimension));
    table.add(Box::new(batches)).execute().await?;
    Ok(())
  }

  pub async fn delete_embeddings(&self, key: &AnnKey, chunk_ids: &[Uuid]) -> Result<()> {
    if chunk_ids.is_empty() {
      return Ok(());
    }
    let ids = chunk_ids
      .iter()
      .map(|id| format!("'{id}'"))
      .collect::<Vec<_>>()
      .join(", ");
    let table = self.embedding_table(key).await?;
    table.delete(&format!("chunk_id IN ({ids})")).await?;
    Ok(())
  }

  /// Vector similarity search against `key`'s table, returning
  /// `(chunk_id, distance)` pairs ordered nearest-first by LanceDB.
  pub async fn vector_search(
    &self,
    key: &AnnKey,
    query_vector: &[f32],
    limit: usize,
  ) -> Result<Vec<(Uuid, f32)>> {
    let table = self.embedding_table(key).await?;
    let results: Vec<RecordBatch> = table
      .vector_search(query_vector.to_vec())?
      .limit(limit)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut hits = Vec::new();
    for batch in &results {
      let chunk_ids = batch
        .column_by_name("chunk_id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| DbError::NotFound("column chunk_id".into()))?;
      let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

      for i in 0..batch.num_rows() {
        let id = Uuid::parse_str(chunk_ids.value(i)).map_err(|_| DbError::NotFound("invalid chunk_id".into()))?;
        let distance = distances.map(|arr| arr.value(i)).unwrap_or(0.0);
        hits.push((id, distance));
      }
    }
    Ok(hits)
  }

  /// Ids missing a row in `key`'s table, used by the Embedding
  /// Orchestrator's backfill when a provider is added after chunks already
  /// exist. Caller supplies the candidate ids (e.g. all chunk ids for a
  /// file) since LanceDB has no cheap anti-join.
  pub async fn missing_embeddings(&self, key: &AnnKey, candidate_ids: &[Uuid]) -> Result<Vec<Uuid>> {
    if candidate_ids.is_empty() {
      return Ok(Vec::new());
    }
    let table = self.embedding_table(key).await?;
    let ids = candidate_ids
      .iter()
      .map(|id| format!("'{id}'"))
      .collect::<Vec<_>>()
      .join(", ");
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("chunk_id IN ({ids})"))
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut present = std::collections::HashSet::new();
    for batch in &results {
      if let Some(arr) = batch.column_by_name("chunk_id").and_then(|c| c.as_any().downcast_ref::<StringArray>()) {
        for i in 0..batch.num_rows() {
          if let Ok(id) = Uuid::parse_str(arr.value(i)) {
            present.insert(id);
          }
        }
      }
    }

    Ok(candidate_ids.iter().copied().filter(|id| !present.contains(id)).collect())
  }
}

fn rows_to_batch(key: &AnnKey, rows: &[(Uuid, Vec<f32>)]) -> Result<RecordBatch> {
  let chunk_id = StringArray::from(rows.iter().map(|(id, _)| id.to_string()).collect::<Vec<_>>());
  let provider = StringArray::from(vec![key.provider.clone(); rows.len()]);
  let model = StringArray::from(vec![key.model.clone(); rows.len()]);
  let dimension = UInt32Array::from(vec![key.dimension as u32; rows.len()]);

  let flat: Vec<f32> = rows.iter().flat_map(|(_, v)| v.iter().copied()).collect();
  let values = Float32Array::from(flat);
  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  let vector = FixedSizeListArray::try_new(field, key.dimension as i32, Arc::new(values), None)?;

  Ok(RecordBatch::try_new(
    embedding_table_schema(key.dimension),
    vec![
      Arc::new(chunk_id),
      Arc::new(provider),
      Arc::new(model),
      Arc::new(dimension),
      Arc::new(vector),
    ],
  )?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use sourcelens_core::model::DistanceMetric;

  fn test_key() -> AnnKey {
    AnnKey {
      provider: "ollama".to_string(),
      model: "qwen3-embedding".to_string(),
      dimension: 4,
      distance: DistanceMetric::Cosine,
    }
  }

  #[tokio::test]
  async fn write_and_search_embeddings_round_trip() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    let key = test_key();

    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    store
      .write_embeddings(&key, vec![(a, vec![1.0, 0.0, 0.0, 0.0]), (b, vec![0.0, 1.0, 0.0, 0.0])])
      .await
      .unwrap();

    let hits = store.vector_search(&key, &[1.0, 0.0, 0.0, 0.0], 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, a);
  }

  #[tokio::test]
  async fn write_embeddings_rejects_wrong_dimension() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    let key = test_key();

    let err = store
      .write_embeddings(&key, vec![(Uuid::now_v7(), vec![1.0, 0.0])])
      .await
      .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput(_)));
  }

  #[tokio::test]
  async fn missing_embeddings_reports_unwritten_ids() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    let key = test_key();

    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    store.write_embeddings(&key, vec![(a, vec![1.0, 0.0, 0.0, 0.0])]).await.unwrap();

    let missing = store.missing_embeddings(&key, &[a, b]).await.unwrap();
    assert_eq!(missing, vec![b]);
  }

  #[tokio::test]
  async fn write_embeddings_empty_is_noop() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    store.write_embeddings(&test_key(), Vec::new()).await.unwrap();
  }
}
