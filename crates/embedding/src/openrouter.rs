//! Hosted OpenRouter embedding provider. Adapted from the teacher's
//! `crates/embedding/src/openrouter.rs`: sliding-window rate limiting applied
//! at the HTTP request level so concurrently-dispatched sub-batches
//! self-throttle instead of needing an external semaphore.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider};
use crate::rate_limit::{RateLimitConfig, SlidingWindowLimiter};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/embeddings";
const DEFAULT_MODEL: &str = "openai/text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
const DEFAULT_MAX_BATCH_SIZE: usize = 64;
const QUERY_PREFIX: &str = "query: ";

#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
  client: reqwest::Client,
  api_key: String,
  model: String,
  dimensions: usize,
  max_batch_size: usize,
  rate_limiter: Arc<Mutex<SlidingWindowLimiter>>,
}

impl OpenRouterProvider {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      api_key: api_key.into(),
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
      max_batch_size: DEFAULT_MAX_BATCH_SIZE,
      rate_limiter: Arc::new(Mutex::new(SlidingWindowLimiter::new(RateLimitConfig::for_openrouter()))),
    }
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
    self.max_batch_size = max_batch_size.max(1);
    self
  }

  pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
    self.rate_limiter = Arc::new(Mutex::new(SlidingWindowLimiter::new(config)));
    self
  }

  pub fn max_batch_size(&self) -> usize {
    self.max_batch_size
  }

  pub fn from_env() -> Option<Self> {
    std::env::var("OPENROUTER_API_KEY").ok().map(Self::new)
  }

  async fn acquire_rate_limit_slot(&self) -> Result<(), EmbeddingError> {
    use std::time::Instant;
    use tokio::time::sleep;

    let config = RateLimitConfig::for_openrouter();
    let start = Instant::now();

    loop {
      let wait_time = {
        let mut limiter = self.rate_limiter.lock().await;
        limiter.check_and_record()
      };

      match wait_time {
        None => return Ok(()),
        Some(wait) => {
          if start.elapsed() + wait > config.max_wait {
            return Err(EmbeddingError::ProviderError(format!(
              "rate limit wait time exceeded ({:?})",
              config.max_wait
            )));
          }
          debug!("rate limiter waiting {:?} for slot", wait);
          sleep(wait).await;
        }
      }
    }
  }

  async fn embed_single_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    self.acquire_rate_limit_slot().await?;

    let request = EmbeddingRequest {
      model: &self.model,
      input: EmbeddingInput::Batch(texts.to_vec()),
    };

    let response = self
      .client
      .post(OPENROUTER_URL)
      .header("Authorization", format!("Bearer {}", self.api_key))
      .json(&request)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("OpenRouter batch embedding failed: {} - {}", status, body);
      return Err(EmbeddingError::ProviderError(format!("OpenRouter returned {status}: {body}")));
    }

    let result: EmbeddingResponse = response.json().await?;

    if result.data.len() != texts.len() {
      return Err(EmbeddingError::ProviderError(format!(
        "batch size mismatch: got {} embeddings for {} inputs",
        result.data.len(),
        texts.len()
      )));
    }

    Ok(result.data.into_iter().map(|d| d.embedding).collect())
  }

  async fn embed_batch_concurrent(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let num_batches = texts.len().div_ceil(self.max_batch_size);
    if num_batches <= 1 {
      return self.embed_single_batch(texts).await;
    }

    debug!("Embedding {} texts in {} concurrent sub-batches", texts.len(), num_batches);

    let futures: Vec<_> = texts
      .chunks(self.max_batch_size)
      .enumerate()
      .map(|(batch_idx, chunk)| {
        let provider = self.clone();
        let chunk_owned: Vec<String> = chunk.iter().map(|s| s.to_string()).collect();
        async move {
          let chunk_refs: Vec<&str> = chunk_owned.iter().map(|s| s.as_str()).collect();
          let embeddings = provider.embed_single_batch(&chunk_refs).await?;
          Ok::<_, EmbeddingError>((batch_idx, embeddings))
        }
      })
      .collect();

    #[allow(clippy::type_complexity)]
    let results: Vec<Result<(usize, Vec<Vec<f32>>), EmbeddingError>> = futures::future::join_all(futures).await;

    let mut indexed_results: Vec<(usize, Vec<Vec<f32>>)> = Vec::with_capacity(num_batches);
    for result in results {
      indexed_results.push(result?);
    }
    indexed_results.sort_by_key(|(idx, _)| *idx);

    let mut all_embeddings = Vec::with_capacity(texts.len());
    for (_, embeddings) in indexed_results {
      all_embeddings.extend(embeddings);
    }
    Ok(all_embeddings)
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: EmbeddingInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
  Single(&'a str),
  Batch(Vec<&'a str>),
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenRouterProvider {
  fn name(&self) -> &str {
    "openrouter"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    self.acquire_rate_limit_slot().await?;

    let prefixed;
    let text = match mode {
      EmbeddingMode::Document => text,
      EmbeddingMode::Query => {
        prefixed = format!("{QUERY_PREFIX}{text}");
        prefixed.as_str()
      }
    };

    let request = EmbeddingRequest {
      model: &self.model,
      input: EmbeddingInput::Single(text),
    };

    let response = self
      .client
      .post(OPENROUTER_URL)
      .header("Authorization", format!("Bearer {}", self.api_key))
      .json(&request)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(EmbeddingError::ProviderError(format!("OpenRouter returned {status}: {body}")));
    }

    let result: EmbeddingResponse = response.json().await?;
    result
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .ok_or_else(|| EmbeddingError::ProviderError("no embedding in response".into()))
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    let prefixed: Vec<String> = match mode {
      EmbeddingMode::Document => Vec::new(),
      EmbeddingMode::Query => texts.iter().map(|t| format!("{QUERY_PREFIX}{t}")).collect(),
    };
    let effective: Vec<&str> = if prefixed.is_empty() {
      texts.to_vec()
    } else {
      prefixed.iter().map(String::as_str).collect()
    };
    // OpenRouter's response carries no per-item success/failure, so a
    // sub-batch either fully succeeds or fully fails; per-text isolation on
    // failure happens one layer up, in `ResilientProvider::split_and_retry`.
    let embeddings = self.embed_batch_concurrent(&effective).await?;
    Ok(embeddings.into_iter().map(Some).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn provider_new() {
    let provider = OpenRouterProvider::new("test-key");
    assert_eq!(provider.name(), "openrouter");
    assert_eq!(provider.model_id(), DEFAULT_MODEL);
    assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
    assert_eq!(provider.max_batch_size(), DEFAULT_MAX_BATCH_SIZE);
  }

  #[test]
  fn provider_customization() {
    let provider = OpenRouterProvider::new("test-key")
      .with_model("custom/model", 512)
      .with_max_batch_size(32);
    assert_eq!(provider.model_id(), "custom/model");
    assert_eq!(provider.dimensions(), 512);
    assert_eq!(provider.max_batch_size(), 32);
  }

  #[test]
  fn max_batch_size_minimum_is_one() {
    let provider = OpenRouterProvider::new("test-key").with_max_batch_size(0);
    assert_eq!(provider.max_batch_size(), 1);
  }

  #[tokio::test]
  async fn embed_batch_empty_short_circuits() {
    let provider = OpenRouterProvider::new("test-key");
    let result = provider.embed_batch(&[], EmbeddingMode::Document).await;
    assert!(result.is_ok());
    assert!(result.unwrap().is_empty());
  }

  #[test]
  fn batch_splitting_calculation() {
    let provider = OpenRouterProvider::new("test-key").with_max_batch_size(10);
    assert_eq!(25_usize.div_ceil(provider.max_batch_size()), 3);
    assert_eq!(10_usize.div_ceil(provider.max_batch_size()), 1);
    assert_eq!(11_usize.div_ceil(provider.max_batch_size()), 2);
  }
}
