//! Collapses every lower-crate error into the `RpcErrorKind` taxonomy
//! spec.md §7 defines for the wire boundary, the way `tools/code.rs`
//! collapses `DbError`/`ProjectError` into JSON-RPC error codes.

use sourcelens_db::DbError;
use sourcelens_embedding::{EmbeddingError, OrchestratorError};
use sourcelens_index::IndexError;
use sourcelens_ipc::{RpcError, RpcErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
  #[error("chunk store error: {0}")]
  Db(#[from] DbError),
  #[error("indexing error: {0}")]
  Index(#[from] IndexError),
  #[error("embedding error: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("embedding orchestrator error: {0}")]
  Orchestrator(#[from] OrchestratorError),
  #[error("invalid regex pattern: {0}")]
  InvalidPattern(String),
  #[error("invalid request params: {0}")]
  InvalidParams(String),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("response would exceed the configured budget even after truncation")]
  PayloadTooLarge,
}

impl DaemonError {
  /// Maps every internal failure mode to spec.md §7's `{kind, retryable}`
  /// pair without leaking internals into `message` beyond a `Display`.
  pub fn to_rpc_error(&self) -> RpcError {
    let kind = match self {
      DaemonError::InvalidPattern(_) | DaemonError::InvalidParams(_) => RpcErrorKind::InvalidArgument,
      DaemonError::PayloadTooLarge => RpcErrorKind::PayloadTooLarge,
      DaemonError::Db(DbError::NotFound(_)) => RpcErrorKind::NotFound,
      DaemonError::Db(DbError::InvalidInput(_)) => RpcErrorKind::InvalidArgument,
      DaemonError::Db(DbError::AmbiguousPrefix { .. }) => RpcErrorKind::InvalidArgument,
      DaemonError::Embedding(EmbeddingError::Timeout) => RpcErrorKind::Timeout,
      DaemonError::Embedding(EmbeddingError::NoApiKey) => RpcErrorKind::Unavailable,
      DaemonError::Embedding(_) => RpcErrorKind::Unavailable,
      DaemonError::Orchestrator(_) => RpcErrorKind::Unavailable,
      DaemonError::Index(_) | DaemonError::Db(_) | DaemonError::Io(_) => RpcErrorKind::Internal,
    };
    RpcError::new(kind, self.to_string())
  }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
