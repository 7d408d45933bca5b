//! The Embedding Orchestrator itself (spec.md §4.4): drives one
//! `AdaptiveBatcher` per `(provider, model)` tuple, sanitizes input text,
//! retries/splits failing batches via the wrapped `EmbeddingProvider`, and
//! hands completed batches to a caller-supplied sink for the single bulk
//! insert spec.md mandates (commit-at-store, never at the orchestrator).
//!
//! No direct teacher file owns this shape; it composes
//! [`crate::batcher::AdaptiveBatcher`], [`crate::provider::EmbeddingProvider`]
//! and [`crate::validation`] the way spec.md's Embedding Orchestrator
//! responsibility requires.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::batcher::{AdaptiveBatcher, BatchTuning};
use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider};
use crate::validation::{TextValidationConfig, ValidationResult, validate_and_truncate};

/// A chunk awaiting an embedding for one `(provider, model)` tuple.
#[derive(Debug, Clone)]
pub struct PendingChunk {
  pub chunk_id: uuid::Uuid,
  pub text: String,
}

/// Supplies chunks still missing a vector for a given tuple, ordered by the
/// caller per spec.md's backfill rule (file mtime descending for a newly
/// configured provider).
#[async_trait]
pub trait PendingChunkSource: Send + Sync {
  async fn next_batch(&self, limit: usize) -> Result<Vec<PendingChunk>, OrchestratorError>;
}

/// Receives a completed, dimension-checked batch of vectors for one tuple.
/// Implementations (the Chunk Store) must write the whole batch in a single
/// transaction or none of it.
#[async_trait]
pub trait VectorSink: Send + Sync {
  async fn write_batch(&self, rows: Vec<(uuid::Uuid, Vec<f32>)>) -> Result<(), OrchestratorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  #[error(transparent)]
  Embedding(#[from] EmbeddingError),
  #[error("sink error: {0}")]
  Sink(String),
  #[error("source error: {0}")]
  Source(String),
}

/// Drives embedding for one `(provider, model)` tuple end to end: pull a
/// batch, sanitize, embed with retry, persist, adapt batch size, repeat
/// until the source reports nothing left.
pub struct Orchestrator {
  provider: Arc<dyn EmbeddingProvider>,
  batcher: AdaptiveBatcher,
  validation: TextValidationConfig,
}

impl Orchestrator {
  pub fn new(provider: Arc<dyn EmbeddingProvider>, tuning: BatchTuning, context_length: usize) -> Self {
    Self {
      provider,
      batcher: AdaptiveBatcher::new(tuning),
      validation: TextValidationConfig::for_context_length(context_length),
    }
  }

  pub fn current_batch_size(&self) -> usize {
    self.batcher.current_size()
  }

  /// Run one backfill pass: repeatedly pulls batches from `source` sized by
  /// the current adaptive batch size, embeds them, and writes vectors to
  /// `sink`, until the source yields an empty batch. Returns the number of
  /// chunks embedded.
  pub async fn run_backfill(
    &mut self,
    source: &dyn PendingChunkSource,
    sink: &dyn VectorSink,
  ) -> Result<usize, OrchestratorError> {
    let mut total = 0usize;

    loop {
      let batch = source.next_batch(self.batcher.current_size()).await?;
      if batch.is_empty() {
        break;
      }

      let sanitized: Vec<String> = batch
        .iter()
        .map(|c| {
          let (text, result) = validate_and_truncate(&c.text, &self.validation);
          if matches!(result, ValidationResult::SentinelSubstituted) {
            warn!(chunk_id = %c.chunk_id, "chunk text was empty/whitespace, embedding sentinel instead");
          }
          text
        })
        .collect();
      let refs: Vec<&str> = sanitized.iter().map(String::as_str).collect();

      let started = Instant::now();
      let vectors = match self.provider.embed_batch(&refs, EmbeddingMode::Document).await {
        Ok(v) => v,
        Err(e) => {
          // A whole-batch failure at this point is one the provider
          // couldn't isolate to specific texts (see `ResilientProvider`,
          // which drops individually unembeddable texts rather than
          // erroring here). Stop this sweep rather than losing every other
          // pending chunk to one bad batch; the next backfill pass picks
          // these chunks back up.
          self.batcher.record_rate_limited();
          warn!(err = %e, batch_size = batch.len(), "embedding batch failed, ending this backfill sweep early");
          break;
        }
      };
      let elapsed = started.elapsed();

      if vectors.len() != batch.len() {
        return Err(OrchestratorError::Embedding(EmbeddingError::ProviderError(format!(
          "provider returned {} vectors for {} inputs",
          vectors.len(),
          batch.len()
        ))));
      }

      let mut rows = Vec::with_capacity(batch.len());
      let mut skipped = 0usize;
      for (chunk, vector) in batch.into_iter().zip(vectors) {
        match vector {
          Some(v) => rows.push((chunk.chunk_id, v)),
          None => {
            skipped += 1;
            warn!(chunk_id = %chunk.chunk_id, "chunk text could not be embedded, leaving it pending");
          }
        }
      }
      if skipped > 0 {
        warn!(skipped, "some chunks in this batch were not embeddable and were left for a later sweep");
      }

      let batch_len = rows.len();
      if !rows.is_empty() {
        sink.write_batch(rows).await?;
      }

      self.batcher.record_success(batch_len, elapsed);
      total += batch_len;
    }

    Ok(total)
  }
}
