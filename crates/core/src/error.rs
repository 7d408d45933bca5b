use thiserror::Error;

/// Errors shared by every crate that depends on `sourcelens-core`: config
/// loading and the handful of domain invariants enforced at this layer.
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("invalid configuration: {0}")]
  ConfigInvalid(String),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("toml parse error: {0}")]
  Toml(#[from] toml::de::Error),
  #[error("empty chunk rejected at creation: {symbol} ({start}-{end})")]
  EmptyChunk { symbol: String, start: u32, end: u32 },
}
