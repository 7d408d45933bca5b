use sourcelens_db::DbError;
use sourcelens_parser::ParserError;
use thiserror::Error;

/// Failure modes of the Indexing Coordinator, per spec.md §4.3/§7. Hard
/// parser errors and database errors during commit are distinguished so the
/// coordinator can apply the right retry policy to each.
#[derive(Debug, Error)]
pub enum IndexError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("parser error: {0}")]
  Parser(#[from] ParserError),
  #[error("chunk store error: {0}")]
  Db(#[from] DbError),
  #[error("file watcher error: {0}")]
  Watch(#[from] notify::Error),
  #[error("file exceeds configured max size ({size} > {max})")]
  FileTooLarge { size: u64, max: u64 },
  #[error("queue is closed")]
  QueueClosed,
}

pub type Result<T> = std::result::Result<T, IndexError>;
