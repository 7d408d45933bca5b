//! Chunk CRUD and the two read paths spec.md §4.5 names: `regex_search`
//! (literal/regex grep over `code`) and vector search, the latter kept in
//! `embeddings.rs` since it reads from a per-tuple table. Grounded on
//! `crates/db/src/code.rs`'s Arrow-conversion helpers and `.only_if()`
//! filter idiom.

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, UInt32Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use sourcelens_core::model::{Chunk, ChunkType, Language};
use std::sync::Arc;
use uuid::Uuid;

use crate::connection::ChunkStore;
use crate::error::{DbError, Result};
use crate::schema::chunks_schema;

/// Result of `replace_chunks`: which chunk ids stayed (embeddings intact),
/// which were removed (cascade-delete their embeddings), and which are new
/// (enqueue for embedding).
#[derive(Debug, Clone, Default)]
pub struct ChunkDiff {
  pub kept: Vec<Uuid>,
  pub removed: Vec<Uuid>,
  pub added: Vec<Uuid>,
}

impl ChunkStore {
  /// Insert chunks for a file. The Indexing Coordinator computes the
  /// kept/removed/added diff (spec.md §4.3) before calling this; this
  /// method itself does not diff, it only appends.
  pub async fn add_chunks(&self, chunks: &[Chunk]) -> Result<()> {
    if chunks.is_empty() {
      return Ok(());
    }

    let table = self.chunks_table().await?;
    let batch = chunks_to_batch(chunks)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], chunks_schema());
    table.add(Box::new(batches)).execute().await?;
    Ok(())
  }

  pub async fn delete_chunks(&self, chunk_ids: &[Uuid]) -> Result<()> {
    if chunk_ids.is_empty() {
      return Ok(());
    }
    let ids = chunk_ids
      .iter()
      .map(|id| format!("'{id}'"))
      .collect::<Vec<_>>()
      .join(", ");
    let table = self.chunks_table().await?;
    table.delete(&format!("id IN ({ids})")).await?;
    Ok(())
  }

  /// Apply the kept/removed/added diff of spec.md §4.3 for one file in a
  /// single call: `new_chunks` are drafts with freshly minted ids. Chunks
  /// whose `(kind, symbol, content_hash)` identity matches an existing row
  /// keep that row's id (and therefore its embeddings) but have their span
  /// updated in place; everything else in the existing set is deleted and
  /// everything new is inserted. Returns the ids added (to enqueue for
  /// embedding) and removed (to cascade-delete from embedding tables).
  pub async fn replace_chunks(&self, file_id: Uuid, new_chunks: Vec<Chunk>) -> Result<ChunkDiff> {
    let existing = self.get_chunks_for_file_id(file_id).await?;
    let mut existing_by_identity: std::collections::HashMap<(ChunkType, String, String), Chunk> = existing
      .into_iter()
      .map(|c| ((c.kind, c.symbol.clone(), c.content_hash.clone()), c))
      .collect();

    let mut added = Vec::new();
    let mut kept = Vec::new();
    let mut to_insert = Vec::new();
    let mut to_respan = Vec::new();

    for mut draft in new_chunks {
      let key = (draft.kind, draft.symbol.clone(), draft.content_hash.clone());
      if let Some(existing_chunk) = existing_by_identity.remove(&key) {
        kept.push(existing_chunk.id);
        if existing_chunk.start_line != draft.start_line || existing_chunk.end_line != draft.end_line {
          to_respan.push((existing_chunk.id, draft.start_line, draft.end_line));
        }
      } else {
        draft.file_id = file_id;
        added.push(draft.id);
        to_insert.push(draft);
      }
    }

    let removed: Vec<Uuid> = existing_by_identity.into_values().map(|c| c.id).collect();

    if !removed.is_empty() {
      self.delete_chunks(&removed).await?;
    }
    for (id, start_line, end_line) in to_respan {
      let table = self.chunks_table().await?;
      table
        .update()
        .only_if(format!("id = '{id}'"))
        .column("start_line", start_line.to_string())
        .column("end_line", end_line.to_string())
        .execute()
        .await?;
    }
    if !to_insert.is_empty() {
      self.add_chunks(&to_insert).await?;
    }

    Ok(ChunkDiff { kept, removed, added })
  }

  pub async fn get_chunks_for_file_id(&self, file_id: Uuid) -> Result<Vec<Chunk>> {
    let table = self.chunks_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("file_id = '{file_id}'"))
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut chunks = Vec::new();
    for batch in &results {
      for i in 0..batch.num_rows() {
        chunks.push(batch_to_chunk(batch, i)?);
      }
    }
    Ok(chunks)
  }

  pub async fn get_chunk(&self, id: Uuid) -> Result<Option<Chunk>> {
    let table = self.chunks_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("id = '{id}'"))
      .execute()
      .await?
      .try_collect()
      .await?;

    for batch in &results {
      if batch.num_rows() > 0 {
        return Ok(Some(batch_to_chunk(batch, 0)?));
      }
    }
    Ok(None)
  }

  /// Resolve a full id or a >=6 character prefix to exactly one chunk.
  pub async fn get_chunk_by_id_or_prefix(&self, id_or_prefix: &str) -> Result<Option<Chunk>> {
    if let Ok(id) = Uuid::parse_str(id_or_prefix) {
      return self.get_chunk(id).await;
    }

    if id_or_prefix.len() < 6 {
      return Err(DbError::InvalidInput("id prefix must be at least 6 characters".into()));
    }

    let table = self.chunks_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("id LIKE '{id_or_prefix}%'"))
      .limit(2)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut matches = Vec::new();
    for batch in &results {
      for i in 0..batch.num_rows() {
        matches.push(batch_to_chunk(batch, i)?);
      }
    }

    match matches.len() {
      0 => Ok(None),
      1 => Ok(matches.into_iter().next()),
      count => Err(DbError::AmbiguousPrefix {
        prefix: id_or_prefix.to_string(),
        count,
      }),
    }
  }

  /// Regex search over chunk source text (spec.md §4.5's `regex_search`
  /// tool), pushed down to LanceDB as a `regexp_match` filter predicate
  /// rather than fetched-then-filtered client-side.
  pub async fn regex_search(&self, pattern: &str, limit: usize) -> Result<Vec<Chunk>> {
    let escaped = pattern.replace('\'', "''");
    let table = self.chunks_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("regexp_match(code, '{escaped}')"))
      .limit(limit)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut chunks = Vec::new();
    for batch in &results {
      for i in 0..batch.num_rows() {
        chunks.push(batch_to_chunk(batch, i)?);
      }
    }
    Ok(chunks)
  }
}

fn chunks_to_batch(chunks: &[Chunk]) -> Result<RecordBatch> {
  let id = StringArray::from(chunks.iter().map(|c| c.id.to_string()).collect::<Vec<_>>());
  let file_id = StringArray::from(chunks.iter().map(|c| c.file_id.to_string()).collect::<Vec<_>>());
  let symbol = StringArray::from(chunks.iter().map(|c| c.symbol.clone()).collect::<Vec<_>>());
  let start_line = UInt32Array::from(chunks.iter().map(|c| c.start_line).collect::<Vec<_>>());
  let end_line = UInt32Array::from(chunks.iter().map(|c| c.end_line).collect::<Vec<_>>());
  let kind = StringArray::from(chunks.iter().map(|c| chunk_type_str(c.kind)).collect::<Vec<_>>());
  let code = StringArray::from(chunks.iter().map(|c| c.code.clone()).collect::<Vec<_>>());
  let content_hash = StringArray::from(chunks.iter().map(|c| c.content_hash.clone()).collect::<Vec<_>>());
  let language = StringArray::from(chunks.iter().map(|c| c.language.as_str().to_string()).collect::<Vec<_>>());

  Ok(RecordBatch::try_new(
    chunks_schema(),
    vec![
      Arc::new(id),
      Arc::new(file_id),
      Arc::new(symbol),
      Arc::new(start_line),
      Arc::new(end_line),
      Arc::new(kind),
      Arc::new(code),
      Arc::new(content_hash),
      Arc::new(language),
    ],
  )?)
}

fn batch_to_chunk(batch: &RecordBatch, row: usize) -> Result<Chunk> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };
  let get_u32 = |name: &str| -> Result<u32> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };

  Ok(Chunk {
    id: Uuid::parse_str(&get_string("id")?).map_err(|_| DbError::NotFound("invalid id".into()))?,
    file_id: Uuid::parse_str(&get_string("file_id")?).map_err(|_| DbError::NotFound("invalid file_id".into()))?,
    symbol: get_string("symbol")?,
    start_line: get_u32("start_line")?,
    end_line: get_u32("end_line")?,
    kind: chunk_type_from_str(&get_string("kind")?),
    code: get_string("code")?,
    content_hash: get_string("content_hash")?,
    language: language_from_str(&get_string("language")?),
  })
}

fn chunk_type_str(kind: ChunkType) -> String {
  match kind {
    ChunkType::Function => "function",
    ChunkType::Method => "method",
    ChunkType::Class => "class",
    ChunkType::Closure => "closure",
    ChunkType::Trait => "trait",
    ChunkType::Interface => "interface",
    ChunkType::Enum => "enum",
    ChunkType::Struct => "struct",
    ChunkType::Module => "module",
    ChunkType::Header => "header",
    ChunkType::CodeBlock => "code_block",
    ChunkType::Script => "script",
    ChunkType::Block => "block",
  }
  .to_string()
}

fn chunk_type_from_str(s: &str) -> ChunkType {
  use ChunkType::*;
  match s {
    "function" => Function,
    "method" => Method,
    "class" => Class,
    "closure" => Closure,
    "trait" => Trait,
    "interface" => Interface,
    "enum" => Enum,
    "struct" => Struct,
    "module" => Module,
    "header" => Header,
    "code_block" => CodeBlock,
    "script" => Script,
    _ => Block,
  }
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
