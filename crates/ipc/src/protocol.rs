use serde::{Deserialize, Serialize};

use crate::Method;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request<P = serde_json::Value> {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  pub method: Method,
  #[serde(default)]
  pub params: P,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<R = serde_json::Value> {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<R>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<RpcError>,
}

/// spec.md §6's error shape: `{kind, message, retryable}`. `retryable` is
/// the field the teacher's `RpcError {code, message}` lacked entirely —
/// callers need it to decide whether to retry a `search_semantic` call
/// that hit a rate-limited provider versus one that sent a malformed
/// pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
  pub kind: RpcErrorKind,
  pub message: String,
  pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
  InvalidArgument,
  NotFound,
  Unavailable,
  Internal,
  Timeout,
  PayloadTooLarge,
}

impl RpcError {
  pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
    let retryable = matches!(kind, RpcErrorKind::Unavailable | RpcErrorKind::Timeout);
    Self {
      kind,
      message: message.into(),
      retryable,
    }
  }
}

impl<R: Serialize> Response<R> {
  pub fn success(id: Option<u64>, result: R) -> Self {
    Self {
      id,
      result: Some(result),
      error: None,
    }
  }
}

impl Response<()> {
  pub fn error(id: Option<u64>, error: RpcError) -> Self {
    Self {
      id,
      result: None,
      error: Some(error),
    }
  }
}
