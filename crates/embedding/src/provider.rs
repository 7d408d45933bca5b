//! The `EmbeddingProvider` trait and its errors, grounded in
//! `crates/backend/src/embedding/mod.rs` — the only place in the corpus
//! where the trait carries the query/document mode asymmetry spec.md §4.4
//! requires (qwen3-embedding-style models embed a search query differently
//! from the document text it's matched against).

use std::sync::Arc;

use async_trait::async_trait;
use sourcelens_core::config::{EmbeddingConfig, ProviderConfig};
use thiserror::Error;

use crate::ollama::OllamaProvider;
use crate::openrouter::OpenRouterProvider;
use crate::resilient::{ResilientProvider, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingMode {
  #[default]
  Document,
  Query,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError>;

  /// One vector per input text, in order. A `None` slot means that text
  /// could not be embedded (spec.md §4.4's `InvalidInput`) and was dropped
  /// rather than failing the whole call; every other slot still succeeded.
  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError>;
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
  #[error("no API key configured for this provider")]
  NoApiKey,
  #[error(transparent)]
  Request(#[from] reqwest::Error),
  #[error("provider returned an error: {0}")]
  ProviderError(String),
  #[error("network error: {0}")]
  Network(String),
  #[error("request timed out")]
  Timeout,
  /// The provider asked the caller to back off, optionally naming how long.
  #[error("rate limited")]
  RateLimited(Option<std::time::Duration>),
  /// Transient provider-side failure distinct from a network/timeout error,
  /// e.g. a 5xx with a body indicating momentary overload.
  #[error("transient provider error: {0}")]
  Transient(String),
  /// The provider rejected specific inputs in a batch (content policy,
  /// malformed text); these indices are never embeddable as sent and
  /// should be dropped rather than retried.
  #[error("provider rejected input at indices {0:?}")]
  InvalidInput(Vec<usize>),
  /// Unrecoverable: retrying or splitting the batch further won't help,
  /// e.g. the account is suspended.
  #[error("unrecoverable provider error: {0}")]
  Fatal(String),
}

/// Builds the provider the embedding orchestrator will drive for a given
/// named provider config, grounded in `impl dyn EmbeddingProvider::from_config`
/// in the same teacher file: local providers run bare, hosted providers get
/// wrapped in a resilient retry layer tuned for cloud latency/error modes.
pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
  match name {
    "ollama" => {
      let mut provider = OllamaProvider::new().with_model(config.model.clone(), config.dim);
      if let Some(base_url) = &config.base_url {
        provider = provider.with_url(base_url.clone());
      }
      Ok(Arc::new(provider))
    }
    "openrouter" => {
      let api_key = config.api_key.clone().ok_or(EmbeddingError::NoApiKey)?;
      let provider = OpenRouterProvider::new(api_key).with_model(config.model.clone(), config.dim);
      Ok(Arc::new(ResilientProvider::new(provider, RetryConfig::for_cloud())))
    }
    other => Err(EmbeddingError::ProviderError(format!("unknown embedding provider {other:?}"))),
  }
}

/// Resolve the default provider named in an `EmbeddingConfig`.
pub fn default_provider(embedding: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
  let provider_config = embedding
    .providers
    .get(&embedding.default_provider)
    .ok_or_else(|| EmbeddingError::ProviderError(format!("no provider config for {:?}", embedding.default_provider)))?;
  from_config(&embedding.default_provider, provider_config)
}
