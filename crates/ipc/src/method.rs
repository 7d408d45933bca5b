use serde::{Deserialize, Serialize};

/// The four tools spec.md §6 recognizes on the stdio/TCP JSON-RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
  SearchRegex,
  SearchSemantic,
  GetStats,
  HealthCheck,
}
