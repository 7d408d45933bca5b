//! Embedding Orchestrator (spec.md §4.4): pluggable providers behind one
//! trait, wrapped in rate limiting and retry, fed by an adaptive batcher.

pub mod batcher;
pub mod ollama;
pub mod openrouter;
pub mod orchestrator;
pub mod provider;
pub mod rate_limit;
pub mod resilient;
pub mod validation;

pub use batcher::{AdaptiveBatcher, BatchTuning};
pub use ollama::{OllamaHealthStatus, OllamaProvider};
pub use openrouter::OpenRouterProvider;
pub use orchestrator::{Orchestrator, OrchestratorError, PendingChunk, PendingChunkSource, VectorSink};
pub use provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider, default_provider, from_config};
pub use rate_limit::{RateLimitConfig, RateLimitedProvider, SlidingWindowLimiter, wrap_rate_limited};
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error};
pub use validation::{EMPTY_TEXT_SENTINEL, TextValidationConfig, ValidationResult, validate_and_truncate};
