//! Local Ollama embedding provider. Adapted directly from the teacher's
//! `crates/embedding/src/ollama.rs`: native `/api/embed` batch endpoint with
//! semaphore-bounded concurrent sub-batches, falling back to per-text
//! parallel requests if the native batch endpoint errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::{EmbeddingError, EmbeddingMode, EmbeddingProvider};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen3-embedding";
const DEFAULT_DIMENSIONS: usize = 4096;
const DEFAULT_CONTEXT_LENGTH: usize = 32768;
const DEFAULT_MAX_BATCH_SIZE: usize = 64;
const AVG_CHUNK_TOKENS: usize = 512;
const DEFAULT_MAX_CONCURRENT: usize = 4;

/// qwen3-embedding-style models expect a query-specific instruction prefix
/// so the asymmetric query/document embedding space lines up (spec.md
/// §4.4's `EmbeddingMode`).
const QUERY_PREFIX: &str = "query: ";

fn calculate_max_batch_size(context_length: usize) -> usize {
  let calculated = context_length / AVG_CHUNK_TOKENS;
  calculated.clamp(1, DEFAULT_MAX_BATCH_SIZE)
}

fn apply_mode<'a>(text: &'a str, mode: EmbeddingMode, scratch: &'a mut String) -> &'a str {
  match mode {
    EmbeddingMode::Document => text,
    EmbeddingMode::Query => {
      scratch.push_str(QUERY_PREFIX);
      scratch.push_str(text);
      scratch.as_str()
    }
  }
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
  context_length: usize,
  max_batch_size: usize,
}

impl Default for OllamaProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl OllamaProvider {
  pub fn new() -> Self {
    let max_batch_size = calculate_max_batch_size(DEFAULT_CONTEXT_LENGTH);
    Self {
      client: reqwest::Client::new(),
      base_url: DEFAULT_OLLAMA_URL.to_string(),
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
      context_length: DEFAULT_CONTEXT_LENGTH,
      max_batch_size,
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  pub fn with_context_length(mut self, context_length: usize) -> Self {
    self.context_length = context_length;
    self.max_batch_size = calculate_max_batch_size(context_length);
    self
  }

  pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
    self.max_batch_size = max_batch_size.max(1);
    self
  }

  pub fn max_batch_size(&self) -> usize {
    self.max_batch_size
  }

  pub fn context_length(&self) -> usize {
    self.context_length
  }

  fn embeddings_url(&self) -> String {
    format!("{}/api/embeddings", self.base_url)
  }

  fn embed_url(&self) -> String {
    format!("{}/api/embed", self.base_url)
  }

  fn tags_url(&self) -> String {
    format!("{}/api/tags", self.base_url)
  }

  pub async fn check_health(&self) -> OllamaHealthStatus {
    let available = matches!(
      self
        .client
        .get(&self.base_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await,
      Ok(response) if response.status().is_success()
    );

    if !available {
      return OllamaHealthStatus {
        available: false,
        models: vec![],
        configured_model: self.model.clone(),
        configured_model_available: false,
      };
    }

    let models: Vec<String> = match self.client.get(self.tags_url()).send().await {
      Ok(response) if response.status().is_success() => {
        #[derive(Deserialize)]
        struct TagsResponse {
          models: Vec<ModelInfo>,
        }
        #[derive(Deserialize)]
        struct ModelInfo {
          name: String,
        }
        response
          .json::<TagsResponse>()
          .await
          .map(|t| t.models.into_iter().map(|m| m.name).collect())
          .unwrap_or_default()
      }
      _ => vec![],
    };

    let configured_model_available = models
      .iter()
      .any(|m| m.starts_with(&self.model) || self.model.starts_with(m));

    OllamaHealthStatus {
      available,
      models,
      configured_model: self.model.clone(),
      configured_model_available,
    }
  }

  async fn embed_batch_native(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    let num_batches = texts.len().div_ceil(self.max_batch_size);
    if num_batches <= 1 {
      return self.embed_single_batch(texts).await;
    }

    debug!(
      "Embedding {} texts in {} concurrent sub-batches (max batch size: {})",
      texts.len(),
      num_batches,
      self.max_batch_size
    );

    let semaphore = Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT));
    let futures: Vec<_> = texts
      .chunks(self.max_batch_size)
      .enumerate()
      .map(|(batch_idx, chunk)| {
        let permit = semaphore.clone();
        let provider = self.clone();
        let chunk_owned: Vec<String> = chunk.iter().map(|s| s.to_string()).collect();
        async move {
          let _permit = permit
            .acquire()
            .await
            .map_err(|_| EmbeddingError::ProviderError("semaphore closed".to_string()))?;
          let chunk_refs: Vec<&str> = chunk_owned.iter().map(|s| s.as_str()).collect();
          let embeddings = provider.embed_single_batch(&chunk_refs).await?;
          Ok((batch_idx, embeddings))
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

    info!("Embedded {} texts in {} concurrent sub-batches", texts.len(), num_batches);
    Ok(all_embeddings)
  }

  async fn embed_single_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let request = BatchEmbeddingRequest {
      model: &self.model,
      input: texts.to_vec(),
    };

    let response = self.client.post(self.embed_url()).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("Ollama batch embedding failed: {} - {}", status, body);
      return Err(EmbeddingError::ProviderError(format!("Ollama returned {status}: {body}")));
    }

    let result: BatchEmbeddingResponse = response.json().await?;

    if result.embeddings.len() != texts.len() {
      return Err(EmbeddingError::ProviderError(format!(
        "batch size mismatch: got {} embeddings for {} inputs",
        result.embeddings.len(),
        texts.len()
      )));
    }

    Ok(result.embeddings)
  }

  /// Per-text fallback when the native batch endpoint rejects the whole
  /// request. Unlike the native path this isolates failures per text: a
  /// semaphore/connection error still aborts the call, but a provider error
  /// embedding one specific text just drops that slot (`None`) so the rest
  /// of the batch still comes back.
  async fn embed_batch_parallel(
    &self,
    texts: &[&str],
    mode: EmbeddingMode,
  ) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    debug!("Using parallel fallback for {} texts", texts.len());
    let semaphore = Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT));

    let futures: Vec<_> = texts
      .iter()
      .map(|text| {
        let permit = semaphore.clone();
        let text = text.to_string();
        let provider = self.clone();
        async move {
          let _permit = permit
            .acquire()
            .await
            .map_err(|_| EmbeddingError::ProviderError("semaphore closed".to_string()))?;
          match provider.embed(&text, mode).await {
            Ok(vector) => Ok(Some(vector)),
            Err(e) => {
              warn!(err = %e, "dropping text as non-embeddable in parallel fallback");
              Ok(None)
            }
          }
        }
      })
      .collect();

    let results: Vec<Result<Option<Vec<f32>>, EmbeddingError>> = futures::future::join_all(futures).await;
    results.into_iter().collect()
  }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OllamaHealthStatus {
  pub available: bool,
  pub models: Vec<String>,
  pub configured_model: String,
  pub configured_model_available: bool,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct BatchEmbeddingRequest<'a> {
  model: &'a str,
  input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbeddingResponse {
  embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
  fn name(&self) -> &str {
    "ollama"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, EmbeddingError> {
    let mut scratch = String::new();
    let prompt = apply_mode(text, mode, &mut scratch);
    let request = EmbeddingRequest {
      model: &self.model,
      prompt,
    };

    let response = self.client.post(self.embeddings_url()).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(EmbeddingError::ProviderError(format!("Ollama returned {status}: {body}")));
    }

    let result: EmbeddingResponse = response.json().await?;
    Ok(result.embedding)
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

    match self.embed_batch_native(&effective).await {
      Ok(embeddings) => Ok(embeddings.into_iter().map(Some).collect()),
      Err(e) => {
        warn!("Native batch embedding failed ({}), falling back to parallel", e);
        self.embed_batch_parallel(texts, mode).await
      }
    }
  }
}
