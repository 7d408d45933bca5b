use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("invalid input: {0}")]
  InvalidInput(String),
  #[error("database query error: {0}")]
  Query(String),
  #[error("ambiguous prefix '{prefix}' matches {count} chunks, use more characters")]
  AmbiguousPrefix { prefix: String, count: usize },
}

pub type Result<T> = std::result::Result<T, DbError>;
