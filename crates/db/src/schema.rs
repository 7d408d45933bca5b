//! Arrow schemas, one function per table, grounded on
//! `crates/backend/src/db/schema.rs`'s pattern. Unlike the teacher, the
//! vector column does not live on the `chunks` table itself: each
//! `(provider, model, dimension)` tuple gets its own dynamically named
//! table (spec.md §4.5's Tuple concept), since a project may hold vectors
//! from more than one provider/model at once.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Schema for the `files` table: one row per canonicalized absolute path.
pub fn files_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("path", DataType::Utf8, false),
    Field::new("language", DataType::Utf8, false),
    Field::new("mtime", DataType::Int64, false), // Unix timestamp ms
    Field::new("content_hash", DataType::Utf8, false),
  ]))
}

/// Schema for the `chunks` table: the AST/line-derived spans, vector-free.
pub fn chunks_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("file_id", DataType::Utf8, false),
    Field::new("symbol", DataType::Utf8, false),
    Field::new("start_line", DataType::UInt32, false),
    Field::new("end_line", DataType::UInt32, false),
    Field::new("kind", DataType::Utf8, false),
    Field::new("code", DataType::Utf8, false),
    Field::new("content_hash", DataType::Utf8, false),
    Field::new("language", DataType::Utf8, false),
  ]))
}

/// Schema for one `embeddings_{provider}_{model}_{dimension}` table.
pub fn embedding_table_schema(dimension: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("chunk_id", DataType::Utf8, false),
    Field::new("provider", DataType::Utf8, false),
    Field::new("model", DataType::Utf8, false),
    Field::new("dimension", DataType::UInt32, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
      false,
    ),
  ]))
}
