use thiserror::Error;

use crate::protocol::RpcErrorKind;

#[derive(Debug, Error)]
pub enum IpcError {
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("rpc error ({kind:?}): {message}")]
  Rpc { kind: RpcErrorKind, message: String },

  #[error("no result in response")]
  NoResult,

  #[error("connection error: {0}")]
  Connection(String),
}
