use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sourcelens_core::model::ChunkType;

/// One hit from `search_regex`/`search_semantic` (spec.md §4.6). `kind` is
/// the chunk's `ChunkType` tag, reused directly from the data model rather
/// than re-declared as a string, since the wire shape and the Chunk Store's
/// own type should never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
  pub path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub symbol: String,
  pub kind: ChunkType,
  pub code_preview: String,
  pub is_truncated: bool,
}

/// `search_semantic`'s hit shape: `SearchHit` plus the `distance` field
/// spec.md §4.6 adds for this tool only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSearchHit {
  #[serde(flatten)]
  pub hit: SearchHit,
  pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
  pub offset: u32,
  pub page_size: u32,
  pub returned: u32,
  pub has_more: bool,
  pub next_offset: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRegexResult {
  pub results: Vec<SearchHit>,
  pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSemanticResult {
  pub results: Vec<SemanticSearchHit>,
  pub pagination: Pagination,
}

/// spec.md §4.7's task coordinator metrics, embedded in `get_stats`'s
/// response rather than requiring a separate tool call for it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskQueueStats {
  pub queued: usize,
  pub in_flight: usize,
  pub completed: u64,
  pub failed: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_error: Option<String>,
  pub running: bool,
}

/// `get_stats`'s result: Chunk Store counts plus task coordinator health,
/// exactly the pairing spec.md §6 specifies. Fields mirror
/// `sourcelens_db::ChunkStoreStats` but are declared independently so the
/// wire contract doesn't drift if the storage layer's internal shape
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetStatsResult {
  pub total_files: usize,
  pub total_chunks: usize,
  pub chunks_by_language: HashMap<String, usize>,
  pub embeddings_by_tuple: HashMap<String, usize>,
  pub pending_by_tuple: HashMap<String, usize>,
  pub queue: TaskQueueStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
  Ok,
  Degraded,
  Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
  pub status: HealthStatus,
  pub details: serde_json::Value,
}
