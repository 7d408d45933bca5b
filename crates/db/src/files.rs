//! File bookkeeping: one row per watched path, used by the Indexing
//! Coordinator to detect added/removed/modified files on startup scan and
//! rescans (spec.md §4.3). Grounded on `crates/db/src/code.rs`'s
//! Arrow-conversion and `.only_if()` idioms.

use arrow_array::{Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use sourcelens_core::model::{File, Language};
use std::sync::Arc;
use uuid::Uuid;

use crate::connection::ChunkStore;
use crate::error::{DbError, Result};
use crate::schema::files_schema;

impl ChunkStore {
  pub async fn upsert_file(&self, file: &File) -> Result<()> {
    let table = self.files_table().await?;
    table.delete(&format!("path = '{}'", escape(&file.path))).await?;

    let batch = file_to_batch(file)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], files_schema());
    table.add(Box::new(batches)).execute().await?;
    Ok(())
  }

  pub async fn get_file_by_path(&self, path: &str) -> Result<Option<File>> {
    let table = self.files_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("path = '{}'", escape(path)))
      .execute()
      .await?
      .try_collect()
      .await?;

    for batch in &results {
      if batch.num_rows() > 0 {
        return Ok(Some(batch_to_file(batch, 0)?));
      }
    }
    Ok(None)
  }

  pub async fn list_files(&self) -> Result<Vec<File>> {
    let table = self.files_table().await?;
    let results: Vec<RecordBatch> = table.query().execute().await?.try_collect().await?;
    let mut files = Vec::new();
    for batch in &results {
      for i in 0..batch.num_rows() {
        files.push(batch_to_file(batch, i)?);
      }
    }
    Ok(files)
  }

  /// Remove a file's row and all of its chunks. Returns the ids of the
  /// removed chunks so the caller can also drop any vectors referencing
  /// them from the per-tuple embedding tables.
  pub async fn delete_file(&self, path: &str) -> Result<Vec<Uuid>> {
    let Some(file) = self.get_file_by_path(path).await? else {
      return Ok(Vec::new());
    };

    let chunk_ids = self
      .get_chunks_for_file_id(file.id)
      .await?
      .into_iter()
      .map(|c| c.id)
      .collect::<Vec<_>>();

    let files = self.files_table().await?;
    files.delete(&format!("path = '{}'", escape(path))).await?;

    let chunks = self.chunks_table().await?;
    chunks.delete(&format!("file_id = '{}'", file.id)).await?;

    Ok(chunk_ids)
  }
}

fn escape(s: &str) -> String {
  s.replace('\'', "''")
}

fn file_to_batch(file: &File) -> Result<RecordBatch> {
  let id = StringArray::from(vec![file.id.to_string()]);
  let path = StringArray::from(vec![file.path.clone()]);
  let language = StringArray::from(vec![file.language.as_str().to_string()]);
  let mtime = Int64Array::from(vec![file.mtime.timestamp_millis()]);
  let content_hash = StringArray::from(vec![file.content_hash.clone()]);

  Ok(RecordBatch::try_new(
    files_schema(),
    vec![
      Arc::new(id),
      Arc::new(path),
      Arc::new(language),
      Arc::new(mtime),
      Arc::new(content_hash),
    ],
  )?)
}

fn batch_to_file(batch: &RecordBatch, row: usize) -> Result<File> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };
  let get_i64 = |name: &str| -> Result<i64> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };

  let id = Uuid::parse_str(&get_string("id")?).map_err(|_| DbError::NotFound("invalid id".into()))?;
  let language = language_from_str(&get_string("language")?);
  let mtime = chrono::Utc
    .timestamp_millis_opt(get_i64("mtime")?)
    .single()
    .ok_or_else(|| DbError::NotFound("invalid mtime".into()))?;

  Ok(File {
    id,
    path: get_string("path")?,
    language,
    mtime,
    content_hash: get_string("content_hash")?,
  })
}

fn language_from_str(s: &str) -> Language {
  use Language::*;
  match s {
    "rust" => Rust,
    "python" => Python,
    "typescript" => TypeScript,
    "tsx" => Tsx,
    "javascript" => JavaScript,
    "jsx" => Jsx,
    "go" => Go,
    "java" => Java,
    "kotlin" => Kotlin,
    "csharp" => CSharp,
    "cpp" => Cpp,
    "c" => C,
    "ruby" => Ruby,
    "php" => Php,
    "ocaml" => Ocaml,
    "bash" => Bash,
    "scala" => Scala,
    "lua" => Lua,
    "zig" => Zig,
    "json" => Json,
    "yaml" => Yaml,
    "toml" => Toml,
    "html" => Html,
    "css" => Css,
    _ => Markdown,
  }
}

use chrono::TimeZone;

#[cfg(test)]
mod tests {
  use super::*;
  use sourcelens_core::compute_content_hash;
  use tempfile::TempDir;

  fn test_file(path: &str) -> File {
    let content = "fn main() {}";
    File {
      id: Uuid::now_v7(),
      path: path.to_string(),
      language: Language::Rust,
      mtime: chrono::Utc::now(),
      content_hash: compute_content_hash(content),
    }
  }

  #[tokio::test]
  async fn upsert_and_get_file_round_trips() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    let file = test_file("src/main.rs");
    store.upsert_file(&file).await.unwrap();

    let fetched = store.get_file_by_path("src/main.rs").await.unwrap().unwrap();
    assert_eq!(fetched.id, file.id);
    assert_eq!(fetched.content_hash, file.content_hash);
  }

  #[tokio::test]
  async fn upsert_replaces_existing_row_for_path() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    let mut file = test_file("src/lib.rs");
    store.upsert_file(&file).await.unwrap();

    file.content_hash = "changed".to_string();
    store.upsert_file(&file).await.unwrap();

    let files = store.list_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].content_hash, "changed");
  }

  #[tokio::test]
  async fn missing_file_returns_none() {
    let temp = TempDir::new().unwrap();
    let store = ChunkStore::open(temp.path().join("t.lance")).await.unwrap();
    assert!(store.get_file_by_path("nope.rs").await.unwrap().is_none());
  }
}
