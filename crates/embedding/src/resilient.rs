//! Retry wrapper with exponential backoff and jitter, ported from
//! `crates/backend/src/embedding/resilient.rs`. On persistent batch failure
//! it binary-splits the batch to isolate the offending text rather than
//! failing the whole request.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub backoff_multiplier: f64,
  pub add_jitter: bool,
  pub request_timeout: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(30),
      backoff_multiplier: 2.0,
      add_jitter: true,
      request_timeout: Duration::from_secs(60),
    }
  }
}

impl RetryConfig {
  pub fn for_cloud() -> Self {
    Self {
      max_retries: 5,
      initial_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(60),
      backoff_multiplier: 2.0,
      add_jitter: true,
      request_timeout: Duration::from_secs(120),
    }
  }

  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
    }

    backoff.min(self.max_backoff)
  }
}

pub fn is_retryable_error(error: &EmbeddingError) -> bool {
  match error {
    EmbeddingError::Network(_) => true,
    EmbeddingError::Timeout => true,
    EmbeddingError::RateLimited(_) => true,
    EmbeddingError::Transient(_) => true,
    EmbeddingError::ProviderError(msg) => {
      msg.contains("429") || msg.contains("502") || msg.contains("503") || msg.contains("504")
    }
    _ => false,
  }
}

/// Errors that won't resolve by dropping the one text that triggered them:
/// retrying the rest of the batch would just hit the same wall.
fn is_fatal_error(error: &EmbeddingError) -> bool {
  matches!(error, EmbeddingError::NoApiKey | EmbeddingError::Fatal(_))
}

pub struct ResilientProvider<P: EmbeddingProvider> {
  inner: P,
  config: RetryConfig,
}

type BoxedEmbedFuture<'a> =
  std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Option<Vec<f32>>>, EmbeddingError>> + Send + 'a>>;

impl<P: EmbeddingProvider> ResilientProvider<P> {
  pub fn new(provider: P, config: RetryConfig) -> Self {
    Self {
      inner: provider,
      config,
    }
  }

  pub fn with_config(provider: P, config: RetryConfig) -> Self {
    Self::new(provider, config)
  }

  async fn embed_with_retry(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let mut last_error = None;
    let max_retries = self.config.max_retries;

    for attempt in 0..=max_retries {
      if attempt > 0 {
        let backoff = self.config.backoff_for_attempt(attempt - 1);
        trace!(backoff_ms = backoff.as_millis(), "applying backoff before retry");
        sleep(backoff).await;
      }

      match tokio::time::timeout(self.config.request_timeout, self.inner.embed(text, mode)).await {
        Ok(Ok(result)) => {
          if attempt > 0 {
            info!(attempt, "single embed succeeded after retry");
          }
          return Ok(result);
        }
        Ok(Err(e)) => {
          if is_retryable_error(&e) && attempt < max_retries {
            warn!(attempt = attempt + 1, max_retries, err = %e, "retryable error, will retry");
            last_error = Some(e);
            continue;
          }
          return Err(e);
        }
        Err(_) => {
          warn!(attempt = attempt + 1, max_retries, "request timed out");
          last_error = Some(EmbeddingError::Timeout);
          if attempt < max_retries {
            continue;
          }
        }
      }
    }

    Err(last_error.unwrap_or_else(|| EmbeddingError::ProviderError("max retries exceeded".to_string())))
  }

  fn embed_batch_with_retry<'a>(
    &'a self,
    texts: &'a [&'a str],
    mode: EmbeddingMode,
    initial_attempt: u32,
  ) -> BoxedEmbedFuture<'a> {
    Box::pin(async move {
      if texts.is_empty() {
        return Ok(Vec::new());
      }

      let max_retries = self.config.max_retries;
      let mut attempt = initial_attempt;

      loop {
        if attempt > 0 {
          let backoff = self.config.backoff_for_attempt(attempt - 1);
          sleep(backoff).await;
        }

        match tokio::time::timeout(self.config.request_timeout, self.inner.embed_batch(texts, mode)).await {
          Ok(Ok(embeddings)) => {
            if attempt > 0 {
              info!(attempt, batch_size = texts.len(), "batch embed succeeded after retry");
            }
            return Ok(embeddings);
          }
          Ok(Err(e)) if is_retryable_error(&e) && attempt < max_retries => {
            warn!(attempt = attempt + 1, max_retries, batch_size = texts.len(), err = %e, "retryable batch error, will retry");
            attempt += 1;
            continue;
          }
          Ok(Err(e)) if texts.len() > 1 => {
            warn!(attempt = attempt + 1, batch_size = texts.len(), err = %e, "batch failed, splitting to isolate bad text");
            return self.split_and_retry(texts, mode).await;
          }
          Ok(Err(e)) if is_fatal_error(&e) => {
            debug!(attempt = attempt + 1, err = %e, "single text embed failed fatally");
            return Err(e);
          }
          Ok(Err(e)) => {
            // Already isolated to one text and out of retries: the text
            // itself is the problem, not the batch. Drop it instead of
            // failing every other text this split already resolved.
            warn!(attempt = attempt + 1, err = %e, "dropping text as non-embeddable after exhausting retries");
            return Ok(vec![None]);
          }
          Err(_) => {
            if attempt < max_retries {
              attempt += 1;
              continue;
            } else if texts.len() > 1 {
              return self.split_and_retry(texts, mode).await;
            } else {
              warn!(attempt = attempt + 1, "dropping text as non-embeddable after repeated timeouts");
              return Ok(vec![None]);
            }
          }
        }
      }
    })
  }

  async fn split_and_retry(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
    let mid = texts.len() / 2;
    let (left, right) = texts.split_at(mid);

    let (left_result, right_result) =
      tokio::join!(self.embed_batch_with_retry(left, mode, 0), self.embed_batch_with_retry(right, mode, 0));

    let mut results = left_result?;
    results.extend(right_result?);
    Ok(results)
  }
}

#[async_trait]
impl<P: EmbeddingProvider + Send + Sync> EmbeddingProvider for ResilientProvider<P> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner.dimensions()
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    self.embed_with_retry(text, mode).await
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
    self.embed_batch_with_retry(texts, mode, 0).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn backoff_calculation() {
    let config = RetryConfig {
      initial_backoff: Duration::from_secs(1),
      backoff_multiplier: 2.0,
      max_backoff: Duration::from_secs(60),
      add_jitter: false,
      ..Default::default()
    };
    assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
    assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(2));
    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(4));
  }

  #[test]
  fn backoff_respects_max() {
    let config = RetryConfig {
      initial_backoff: Duration::from_secs(10),
      backoff_multiplier: 10.0,
      max_backoff: Duration::from_secs(30),
      add_jitter: false,
      ..Default::default()
    };
    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(30));
  }

  #[test]
  fn retryable_errors_are_identified() {
    assert!(is_retryable_error(&EmbeddingError::Network("reset".to_string())));
    assert!(is_retryable_error(&EmbeddingError::Timeout));
    assert!(is_retryable_error(&EmbeddingError::ProviderError("status 429".to_string())));
    assert!(!is_retryable_error(&EmbeddingError::ProviderError("status 400".to_string())));
  }

  struct MockBatchProvider {
    batch_calls: AtomicUsize,
    fail_batch_until: AtomicUsize,
  }

  impl MockBatchProvider {
    fn new() -> Self {
      Self {
        batch_calls: AtomicUsize::new(0),
        fail_batch_until: AtomicUsize::new(0),
      }
    }

    fn failing_until(attempts: usize) -> Self {
      Self {
        batch_calls: AtomicUsize::new(0),
        fail_batch_until: AtomicUsize::new(attempts),
      }
    }
  }

  #[async_trait]
  impl EmbeddingProvider for MockBatchProvider {
    fn name(&self) -> &str {
      "mock"
    }
    fn model_id(&self) -> &str {
      "mock-model"
    }
    fn dimensions(&self) -> usize {
      4
    }

    async fn embed(&self, _text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
      Ok(vec![0.1; 4])
    }

    async fn embed_batch(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
      let call_num = self.batch_calls.fetch_add(1, Ordering::SeqCst);
      if call_num < self.fail_batch_until.load(Ordering::SeqCst) {
        return Err(EmbeddingError::Network("connection reset".to_string()));
      }
      Ok(texts.iter().map(|_| Some(vec![0.1; 4])).collect())
    }
  }

  #[tokio::test]
  async fn batch_uses_inner_embed_batch() {
    let provider = MockBatchProvider::new();
    let resilient = ResilientProvider::new(
      provider,
      RetryConfig {
        initial_backoff: Duration::from_millis(1),
        ..Default::default()
      },
    );
    let texts: Vec<&str> = (0..10).map(|_| "test text").collect();
    let result = resilient.embed_batch(&texts, EmbeddingMode::Document).await;
    assert!(result.is_ok());
    assert_eq!(result.unwrap().len(), 10);
    assert_eq!(resilient.inner.batch_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn batch_retries_on_transient_error() {
    let provider = MockBatchProvider::failing_until(2);
    let resilient = ResilientProvider::new(
      provider,
      RetryConfig {
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        add_jitter: false,
        ..Default::default()
      },
    );
    let texts = vec!["text1", "text2", "text3"];
    let result = resilient.embed_batch(&texts, EmbeddingMode::Document).await;
    assert!(result.is_ok());
    assert_eq!(resilient.inner.batch_calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn empty_batch_short_circuits() {
    let provider = MockBatchProvider::new();
    let resilient = ResilientProvider::new(provider, RetryConfig::default());
    let result = resilient.embed_batch(&[], EmbeddingMode::Document).await;
    assert!(result.is_ok());
    assert!(result.unwrap().is_empty());
    assert_eq!(resilient.inner.batch_calls.load(Ordering::SeqCst), 0);
  }

  struct PoisonedTextProvider;

  #[async_trait]
  impl EmbeddingProvider for PoisonedTextProvider {
    fn name(&self) -> &str {
      "poison"
    }
    fn model_id(&self) -> &str {
      "poison-model"
    }
    fn dimensions(&self) -> usize {
      4
    }

    async fn embed(&self, _text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
      Ok(vec![0.1; 4])
    }

    async fn embed_batch(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
      if texts.contains(&"poison") {
        return Err(EmbeddingError::ProviderError("content rejected".to_string()));
      }
      Ok(texts.iter().map(|_| Some(vec![0.1; 4])).collect())
    }
  }

  #[tokio::test]
  async fn split_and_retry_isolates_a_single_bad_text_instead_of_failing_the_batch() {
    let resilient = ResilientProvider::new(
      PoisonedTextProvider,
      RetryConfig {
        max_retries: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        add_jitter: false,
        ..Default::default()
      },
    );
    let texts = vec!["good1", "poison", "good2", "good3"];
    let result = resilient
      .embed_batch(&texts, EmbeddingMode::Document)
      .await
      .expect("one bad text should not fail the whole batch");

    assert_eq!(result.len(), 4);
    assert!(result[0].is_some());
    assert!(result[1].is_none(), "the poisoned text should be dropped, not crash the call");
    assert!(result[2].is_some());
    assert!(result[3].is_some());
  }
}
