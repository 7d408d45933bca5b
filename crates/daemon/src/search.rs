//! The Search Service (spec.md §4.6): `search_regex`/`search_semantic` over
//! the Chunk Store, paginated and budgeted to a caller-bounded response
//! size. Grounded in the handler style of `crates/daemon/src/tools/code.rs`
//! (args struct, `Response::error`-style failure mapping) with a token/byte
//! budgeter new to this system, structurally modeled on the optional-field
//! progress-reporting style of `crates/ipc/src/protocol.rs::IndexProgress`.

use std::collections::HashMap;
use std::sync::Arc;

use sourcelens_core::config::{Config, SearchConfig};
use sourcelens_core::model::AnnKey;
use sourcelens_db::ChunkStore;
use sourcelens_embedding::{EmbeddingMode, EmbeddingProvider};
use sourcelens_ipc::{Pagination, SearchHit, SearchRegexResult, SearchSemanticResult, SemanticSearchHit};

use crate::error::{DaemonError, Result};

/// Upper bound spec.md §4.6 places on `max_response_bytes` regardless of
/// what the caller asks for.
const MAX_RESPONSE_BYTES_CEILING: usize = 100 * 1024;
/// The budgeter's hard token ceiling, estimated at 3 bytes/token.
const HARD_TOKEN_CEILING: usize = 25_000;
const BYTES_PER_TOKEN: usize = 3;
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
/// Appended to a `code_preview` that was cut short, per spec.md §4.6.
const TRUNCATION_MARKER: &str = "\n… [truncated]";

pub struct SearchService {
  store: Arc<ChunkStore>,
  search_config: SearchConfig,
}

/// A search hit before pagination/budgeting has trimmed it, common to both
/// `search_regex` and `search_semantic` so the budgeter only has one shape
/// to work with.
struct Candidate {
  path: String,
  start_line: u32,
  end_line: u32,
  symbol: String,
  kind: sourcelens_core::model::ChunkType,
  code: String,
  distance: Option<f32>,
  is_truncated: bool,
}

impl SearchService {
  pub fn new(store: Arc<ChunkStore>, config: &Config) -> Self {
    Self {
      store,
      search_config: config.search.clone(),
    }
  }

  pub async fn search_regex(
    &self,
    pattern: &str,
    page_size: Option<u32>,
    offset: Option<u32>,
    max_response_bytes: Option<u32>,
    language: Option<&str>,
    path_prefix: Option<&str>,
  ) -> Result<SearchRegexResult> {
    regex::Regex::new(pattern).map_err(|e| DaemonError::InvalidPattern(e.to_string()))?;

    let page_size = clamp_page_size(page_size);
    let offset = offset.unwrap_or(0);
    let effective_max = self.effective_max_bytes(max_response_bytes);

    // Oversample past the requested page so filtering by language/path and
    // the budgeter's tail-drops still leave a full page when possible.
    let fetch_limit = (offset as usize + page_size as usize).saturating_mul(4).max(200);
    let chunks = self.store.regex_search(pattern, fetch_limit).await?;

    let files = self.path_index().await?;
    let candidates = self.to_candidates(chunks, &files, language, path_prefix, None);

    let (page, pagination) = paginate_and_budget(candidates, offset, page_size, effective_max);
    let results = page.into_iter().map(Candidate::into_hit).collect();

    Ok(SearchRegexResult { results, pagination })
  }

  pub async fn search_semantic(
    &self,
    provider: &dyn EmbeddingProvider,
    key: &AnnKey,
    query: &str,
    page_size: Option<u32>,
    offset: Option<u32>,
    max_response_bytes: Option<u32>,
    language: Option<&str>,
    path_prefix: Option<&str>,
  ) -> Result<SearchSemanticResult> {
    let page_size = clamp_page_size(page_size);
    let offset = offset.unwrap_or(0);
    let effective_max = self.effective_max_bytes(max_response_bytes);

    let query_vector = provider.embed(query, EmbeddingMode::Query).await?;
    let fetch_limit = (offset as usize + page_size as usize).saturating_mul(4).max(200);
    let hits = self.store.vector_search(key, &query_vector, fetch_limit).await?;

    let files = self.path_index().await?;
    let mut candidates = Vec::with_capacity(hits.len());
    for (chunk_id, distance) in hits {
      let Some(chunk) = self.store.get_chunk(chunk_id).await? else {
        continue;
      };
      candidates.extend(self.to_candidates(vec![chunk], &files, language, path_prefix, Some(distance)));
    }

    let (page, pagination) = paginate_and_budget(candidates, offset, page_size, effective_max);
    let results = page.into_iter().map(Candidate::into_semantic_hit).collect();

    Ok(SearchSemanticResult { results, pagination })
  }

  fn effective_max_bytes(&self, requested: Option<u32>) -> usize {
    effective_max_bytes(requested, self.search_config.max_response_bytes)
  }

  /// `Chunk` carries only `file_id`; build a one-shot `file_id -> path` map
  /// per search call. This re-scans `list_files` the same way
  /// `backfill::ChunkStoreSource` re-walks files per batch: simple and
  /// correct for this system's single-project scope, not optimized for a
  /// large file count.
  async fn path_index(&self) -> Result<HashMap<uuid::Uuid, String>> {
    let files = self.store.list_files().await?;
    Ok(files.into_iter().map(|f| (f.id, f.path)).collect())
  }

  fn to_candidates(
    &self,
    chunks: Vec<sourcelens_core::model::Chunk>,
    files: &HashMap<uuid::Uuid, String>,
    language: Option<&str>,
    path_prefix: Option<&str>,
    distance: Option<f32>,
  ) -> Vec<Candidate> {
    chunks
      .into_iter()
      .filter_map(|chunk| {
        let path = files.get(&chunk.file_id)?.clone();
        if let Some(lang) = language
          && chunk.language.as_str() != lang
        {
          return None;
        }
        if let Some(prefix) = path_prefix
          && !path.starts_with(prefix)
        {
          return None;
        }
        Some(Candidate {
          path,
          start_line: chunk.start_line,
          end_line: chunk.end_line,
          symbol: chunk.symbol,
          kind: chunk.kind,
          code: chunk.code,
          distance,
          is_truncated: false,
        })
      })
      .collect()
  }
}

impl Candidate {
  fn into_hit(self) -> SearchHit {
    SearchHit {
      path: self.path,
      start_line: self.start_line,
      end_line: self.end_line,
      symbol: self.symbol,
      kind: self.kind,
      code_preview: self.code,
      is_truncated: self.is_truncated,
    }
  }

  fn into_semantic_hit(self) -> SemanticSearchHit {
    let distance = self.distance.unwrap_or(f32::MAX);
    let hit = self.into_hit();
    SemanticSearchHit { hit, distance }
  }
}

fn clamp_page_size(requested: Option<u32>) -> u32 {
  requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Shortens `code` to at most `max_bytes`, respecting UTF-8 character
/// boundaries the way `sourcelens_embedding::validation::validate_and_truncate`
/// does, then backs off to the last line boundary so the preview never ends
/// mid-line, and appends an ellipsis marker per spec.md §4.6.
fn truncate_code_preview(code: &str, max_bytes: usize) -> String {
  if code.len() <= max_bytes {
    return code.to_string();
  }

  let budget = max_bytes.saturating_sub(TRUNCATION_MARKER.len());
  let mut truncated = String::new();
  for ch in code.chars() {
    if truncated.len() + ch.len_utf8() > budget {
      break;
    }
    truncated.push(ch);
  }

  if let Some(last_newline) = truncated.rfind('\n') {
    truncated.truncate(last_newline);
  }

  truncated.push_str(TRUNCATION_MARKER);
  truncated
}

fn effective_max_bytes(requested: Option<u32>, configured_default: usize) -> usize {
  let requested = requested.map(|v| v as usize).unwrap_or(configured_default);
  requested.min(MAX_RESPONSE_BYTES_CEILING).min(HARD_TOKEN_CEILING * BYTES_PER_TOKEN)
}

/// Slices `[offset, offset + page_size)` out of `candidates`, then shrinks
/// (dropping from the tail, truncating `code` on the last surviving entry)
/// until the page's estimated serialized size is under `max_response_bytes`
/// per spec.md §4.6. Pagination is a point-in-time snapshot of `candidates`,
/// not a cursor fixed by holding a lock.
fn paginate_and_budget(
  candidates: Vec<Candidate>,
  offset: u32,
  page_size: u32,
  max_response_bytes: usize,
) -> (Vec<Candidate>, Pagination) {
  let total = candidates.len() as u64;
  let start = offset as usize;
  let end = (start + page_size as usize).min(candidates.len());
  let mut page: Vec<Candidate> = if start < candidates.len() {
    candidates.into_iter().skip(start).take(end - start).collect()
  } else {
    Vec::new()
  };

  let mut is_truncated = vec![false; page.len()];
  let mut budget = max_response_bytes;
  let mut keep = page.len();

  for (i, candidate) in page.iter().enumerate() {
    let overhead = candidate.path.len() + candidate.symbol.len() + 64;
    let size = overhead + candidate.code.len();

    if size <= budget {
      budget -= size;
      continue;
    }

    // Doesn't fit whole: truncate its code to whatever budget remains, then
    // drop everything after it.
    if budget > overhead {
      keep = i + 1;
      is_truncated[i] = true;
    } else {
      keep = i;
    }
    break;
  }

  page.truncate(keep);
  is_truncated.truncate(keep);

  if is_truncated.last() == Some(&true) {
    let others_len: usize = page[..page.len() - 1]
      .iter()
      .map(|c| c.path.len() + c.symbol.len() + 64 + c.code.len())
      .sum();
    if let Some(last) = page.last_mut() {
      let overhead = last.path.len() + last.symbol.len() + 64;
      let remaining = max_response_bytes.saturating_sub(overhead).saturating_sub(others_len);
      if last.code.len() > remaining {
        last.code = truncate_code_preview(&last.code, remaining);
      }
      last.is_truncated = true;
    }
  }

  let returned = page.len() as u32;
  let has_more = (start + page.len()) < total as usize;
  let next_offset = if has_more { Some(offset + returned) } else { None };

  let pagination = Pagination {
    offset,
    page_size,
    returned,
    has_more,
    next_offset,
    total: Some(total),
  };

  (page, pagination)
}
