//! Adaptive batch sizing for the Embedding Orchestrator (spec.md §4.4). No
//! direct teacher equivalent drives batch size off measured latency; the
//! clamp-to-`[min, max]` idiom is grounded in `ollama.rs::calculate_max_batch_size`,
//! generalized here from a static context-length formula to a running
//! exponential moving average of per-text latency.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BatchTuning {
  pub min: usize,
  pub max: usize,
  pub initial: usize,
  /// Per-text latency above which a batch is considered "slow" and the
  /// batcher shrinks, grounded in spec.md §4.4's "latency overrun" trigger.
  pub target_latency_per_text: Duration,
  pub grow_factor: f64,
  pub shrink_factor: f64,
  /// Smoothing factor for the latency EMA; closer to 1.0 reacts faster.
  pub ema_alpha: f64,
}

impl Default for BatchTuning {
  fn default() -> Self {
    Self {
      min: 8,
      max: 100,
      initial: 16,
      target_latency_per_text: Duration::from_millis(50),
      grow_factor: 1.5,
      shrink_factor: 0.5,
      ema_alpha: 0.3,
    }
  }
}

/// Tracks the current batch size for one `(provider, model)` tuple and
/// adjusts it after every completed batch, per spec.md §4.4: grow
/// multiplicatively on success within target latency, shrink on rate limit
/// or latency overrun, driven by an EMA of per-text latency.
#[derive(Debug, Clone)]
pub struct AdaptiveBatcher {
  tuning: BatchTuning,
  current_size: usize,
  ema_latency_per_text: Option<Duration>,
}

impl AdaptiveBatcher {
  pub fn new(tuning: BatchTuning) -> Self {
    let current_size = tuning.initial.clamp(tuning.min, tuning.max);
    Self {
      tuning,
      current_size,
      ema_latency_per_text: None,
    }
  }

  pub fn current_size(&self) -> usize {
    self.current_size
  }

  fn update_ema(&mut self, latency_per_text: Duration) {
    self.ema_latency_per_text = Some(match self.ema_latency_per_text {
      None => latency_per_text,
      Some(prev) => {
        let alpha = self.tuning.ema_alpha;
        Duration::from_secs_f64(prev.as_secs_f64() * (1.0 - alpha) + latency_per_text.as_secs_f64() * alpha)
      }
    });
  }

  fn grow(&mut self) {
    let grown = (self.current_size as f64 * self.tuning.grow_factor).round() as usize;
    self.current_size = grown.clamp(self.tuning.min, self.tuning.max);
  }

  fn shrink(&mut self) {
    let shrunk = (self.current_size as f64 * self.tuning.shrink_factor).round() as usize;
    self.current_size = shrunk.clamp(self.tuning.min, self.tuning.max);
  }

  /// Record a successfully embedded batch of `batch_len` texts that took
  /// `elapsed`. Grows the batch size if the observed per-text latency stays
  /// within target, otherwise shrinks.
  pub fn record_success(&mut self, batch_len: usize, elapsed: Duration) {
    if batch_len == 0 {
      return;
    }
    let per_text = elapsed / batch_len as u32;
    self.update_ema(per_text);

    match self.ema_latency_per_text {
      Some(ema) if ema <= self.tuning.target_latency_per_text => self.grow(),
      _ => self.shrink(),
    }
  }

  /// Record a rate-limited or otherwise transient batch failure: always
  /// shrinks, regardless of latency history.
  pub fn record_rate_limited(&mut self) {
    self.shrink();
  }
}
