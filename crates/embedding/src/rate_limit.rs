//! Sliding window rate limiter for hosted providers, adapted from the
//! teacher's `crates/embedding/src/rate_limit.rs`. `RateLimitedProvider`'s
//! `embed`/`embed_batch` now carry the `EmbeddingMode` the authoritative
//! trait shape (`crates/backend/src/embedding/mod.rs`) requires.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
  pub max_requests: usize,
  pub window: Duration,
  pub max_wait: Duration,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      max_requests: 70,
      window: Duration::from_secs(10),
      max_wait: Duration::from_secs(30),
    }
  }
}

impl RateLimitConfig {
  /// OpenRouter's actual limit is 70/10s; 50 leaves a safety margin.
  pub fn for_openrouter() -> Self {
    Self {
      max_requests: 50,
      window: Duration::from_secs(10),
      max_wait: Duration::from_secs(60),
    }
  }

  pub fn new(max_requests: usize, window: Duration) -> Self {
    Self {
      max_requests,
      window,
      max_wait: Duration::from_secs(30),
    }
  }

  pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
    self.max_wait = max_wait;
    self
  }
}

#[derive(Debug)]
pub struct SlidingWindowLimiter {
  config: RateLimitConfig,
  request_times: VecDeque<Instant>,
}

impl SlidingWindowLimiter {
  pub fn new(config: RateLimitConfig) -> Self {
    let capacity = config.max_requests + 1;
    Self {
      config,
      request_times: VecDeque::with_capacity(capacity),
    }
  }

  fn prune_expired(&mut self) {
    let cutoff = Instant::now() - self.config.window;
    while let Some(&oldest) = self.request_times.front() {
      if oldest < cutoff {
        self.request_times.pop_front();
      } else {
        break;
      }
    }
  }

  fn check_and_wait_time(&mut self) -> Option<Duration> {
    self.prune_expired();
    if self.request_times.len() < self.config.max_requests {
      return None;
    }
    let &oldest = self.request_times.front()?;
    let expires_at = oldest + self.config.window;
    let now = Instant::now();
    if expires_at > now { Some(expires_at - now) } else { None }
  }

  fn record_request(&mut self) {
    self.request_times.push_back(Instant::now());
  }

  pub fn check_and_record(&mut self) -> Option<Duration> {
    let wait = self.check_and_wait_time();
    if wait.is_none() {
      self.record_request();
    }
    wait
  }

  fn current_count(&mut self) -> usize {
    self.prune_expired();
    self.request_times.len()
  }
}

/// Wraps another provider so every API call (single or batch) consumes one
/// slot in a sliding window, waiting up to `max_wait` before giving up.
pub struct RateLimitedProvider<P: EmbeddingProvider> {
  inner: P,
  limiter: Arc<Mutex<SlidingWindowLimiter>>,
  config: RateLimitConfig,
}

impl<P: EmbeddingProvider> RateLimitedProvider<P> {
  pub fn new(provider: P) -> Self {
    Self::with_config(provider, RateLimitConfig::default())
  }

  pub fn with_config(provider: P, config: RateLimitConfig) -> Self {
    Self {
      inner: provider,
      limiter: Arc::new(Mutex::new(SlidingWindowLimiter::new(config.clone()))),
      config,
    }
  }

  async fn acquire_slot(&self) -> Result<(), EmbeddingError> {
    let start = Instant::now();

    loop {
      let wait_time = {
        let mut limiter = self.limiter.lock().await;
        limiter.check_and_wait_time()
      };

      match wait_time {
        None => {
          let mut limiter = self.limiter.lock().await;
          limiter.record_request();
          debug!("rate limiter acquired slot ({}/{})", limiter.current_count(), self.config.max_requests);
          return Ok(());
        }
        Some(wait) => {
          if start.elapsed() + wait > self.config.max_wait {
            warn!("rate limiter max wait time exceeded ({:?})", self.config.max_wait);
            return Err(EmbeddingError::ProviderError(format!(
              "rate limit wait time exceeded ({:?})",
              self.config.max_wait
            )));
          }
          sleep(wait).await;
        }
      }
    }
  }
}

#[async_trait]
impl<P: EmbeddingProvider + Send + Sync> EmbeddingProvider for RateLimitedProvider<P> {
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
    self.acquire_slot().await?;
    self.inner.embed(text, mode).await
  }

  async fn embed_batch(&self, texts: &[&str], mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
    self.acquire_slot().await?;
    self.inner.embed_batch(texts, mode).await
  }
}

pub fn wrap_rate_limited<P: EmbeddingProvider>(provider: P, config: RateLimitConfig) -> RateLimitedProvider<P> {
  RateLimitedProvider::with_config(provider, config)
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn rate_limit_config_defaults() {
    let config = RateLimitConfig::default();
    assert_eq!(config.max_requests, 70);
    assert_eq!(config.window, Duration::from_secs(10));
  }

  #[test]
  fn rate_limit_config_openrouter() {
    let config = RateLimitConfig::for_openrouter();
    assert_eq!(config.max_requests, 50);
  }

  #[test]
  fn sliding_window_under_limit() {
    let config = RateLimitConfig::new(5, Duration::from_secs(1));
    let mut limiter = SlidingWindowLimiter::new(config);
    for _ in 0..5 {
      assert!(limiter.check_and_wait_time().is_none());
      limiter.record_request();
    }
  }

  #[test]
  fn sliding_window_at_limit_reports_wait() {
    let config = RateLimitConfig::new(5, Duration::from_secs(10));
    let mut limiter = SlidingWindowLimiter::new(config);
    for _ in 0..5 {
      limiter.record_request();
    }
    let wait = limiter.check_and_wait_time();
    assert!(wait.is_some());
    assert!(wait.unwrap() <= Duration::from_secs(10));
  }

  #[test]
  fn sliding_window_prunes_expired() {
    let config = RateLimitConfig::new(5, Duration::from_millis(10));
    let mut limiter = SlidingWindowLimiter::new(config);
    for _ in 0..5 {
      limiter.record_request();
    }
    assert_eq!(limiter.current_count(), 5);
    std::thread::sleep(Duration::from_millis(15));
    assert_eq!(limiter.current_count(), 0);
  }

  struct MockProvider {
    call_count: AtomicUsize,
  }

  impl MockProvider {
    fn new() -> Self {
      Self {
        call_count: AtomicUsize::new(0),
      }
    }
  }

  #[async_trait]
  impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
      "mock"
    }
    fn model_id(&self) -> &str {
      "mock-model"
    }
    fn dimensions(&self) -> usize {
      384
    }

    async fn embed(&self, _text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
      self.call_count.fetch_add(1, Ordering::SeqCst);
      Ok(vec![0.1; 384])
    }

    async fn embed_batch(&self, texts: &[&str], _mode: EmbeddingMode) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
      self.call_count.fetch_add(1, Ordering::SeqCst);
      Ok(texts.iter().map(|_| Some(vec![0.1; 384])).collect())
    }
  }

  #[tokio::test]
  async fn rate_limited_provider_passthrough() {
    let provider = MockProvider::new();
    let config = RateLimitConfig::new(10, Duration::from_secs(1));
    let limited = RateLimitedProvider::with_config(provider, config);
    let result = limited.embed("test", EmbeddingMode::Document).await;
    assert!(result.is_ok());
    assert_eq!(limited.inner.call_count.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn rate_limited_provider_batch_counts_as_one_call() {
    let provider = MockProvider::new();
    let config = RateLimitConfig::new(10, Duration::from_secs(1));
    let limited = RateLimitedProvider::with_config(provider, config);
    let texts = vec!["a", "b", "c"];
    let result = limited.embed_batch(&texts, EmbeddingMode::Document).await;
    assert!(result.is_ok());
    assert_eq!(result.unwrap().len(), 3);
    assert_eq!(limited.inner.call_count.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn rate_limited_respects_limit() {
    let provider = MockProvider::new();
    let config = RateLimitConfig::new(3, Duration::from_millis(100)).with_max_wait(Duration::from_millis(500));
    let limited = RateLimitedProvider::with_config(provider, config);
    let start = Instant::now();
    for _ in 0..3 {
      limited.embed("test", EmbeddingMode::Document).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_millis(50));
    limited.embed("test", EmbeddingMode::Document).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
  }

  #[tokio::test]
  async fn rate_limited_max_wait_exceeded_errors() {
    let provider = MockProvider::new();
    let config = RateLimitConfig::new(1, Duration::from_secs(10)).with_max_wait(Duration::from_millis(10));
    let limited = RateLimitedProvider::with_config(provider, config);
    limited.embed("test", EmbeddingMode::Document).await.unwrap();
    let result = limited.embed("test", EmbeddingMode::Document).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("rate limit"));
  }
}
