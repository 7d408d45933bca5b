use serde::{Deserialize, Serialize};

/// spec.md §6's `search_regex` params. `page_size`/`offset`/
/// `max_response_bytes` all have server-side defaults, so a caller that
/// omits them still gets a bounded response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchRegexParams {
  pub pattern: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub page_size: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub offset: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_response_bytes: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub language: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path_prefix: Option<String>,
}

/// spec.md §6's `search_semantic` params. `provider`/`model` fall back to
/// `embedding.default_provider`/`.default_model` when omitted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchSemanticParams {
  pub query: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provider: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub page_size: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub offset: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub max_response_bytes: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub language: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetStatsParams;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthCheckParams;
