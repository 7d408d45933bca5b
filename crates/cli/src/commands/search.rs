//! Regex and semantic search, run directly against the chunk store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sourcelens_core::config::Config;
use sourcelens_core::model::AnnKey;
use sourcelens_daemon::SearchService;
use sourcelens_db::ChunkStore;
use sourcelens_ipc::{SearchRegexResult, SearchSemanticResult};

async fn open_store(root: &Option<PathBuf>) -> Result<(Arc<ChunkStore>, Config)> {
  let root = root
    .clone()
    .map(Ok)
    .unwrap_or_else(std::env::current_dir)
    .context("failed to resolve project root")?
    .canonicalize()
    .context("project root does not exist")?;
  let config = Config::load(&root, None).context("failed to load configuration")?;
  let store = Arc::new(
    ChunkStore::open(root.join(&config.db.path))
      .await
      .context("failed to open chunk store")?,
  );
  Ok((store, config))
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_search_regex(
  root: Option<PathBuf>,
  pattern: String,
  limit: u32,
  offset: u32,
  language: Option<String>,
  path_prefix: Option<String>,
  json: bool,
) -> Result<()> {
  let (store, config) = open_store(&root).await?;
  let search = SearchService::new(store, &config);
  let result = search
    .search_regex(&pattern, Some(limit), Some(offset), None, language.as_deref(), path_prefix.as_deref())
    .await
    .context("regex search failed")?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
  } else {
    print_regex_results(&result);
  }
  Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_search_semantic(
  root: Option<PathBuf>,
  query: String,
  provider_name: Option<String>,
  limit: u32,
  offset: u32,
  language: Option<String>,
  path_prefix: Option<String>,
  json: bool,
) -> Result<()> {
  let (store, config) = open_store(&root).await?;

  let name = provider_name.unwrap_or_else(|| config.embedding.default_provider.clone());
  let provider_config = config
    .embedding
    .providers
    .get(&name)
    .with_context(|| format!("no embedding provider configured under the name '{name}'"))?;
  let provider = sourcelens_embedding::from_config(&name, provider_config).context("failed to construct embedding provider")?;
  let key = AnnKey {
    provider: name,
    model: provider_config.model.clone(),
    dimension: provider_config.dim,
    distance: provider_config.distance,
  };

  let search = SearchService::new(store, &config);
  let result = search
    .search_semantic(
      provider.as_ref(),
      &key,
      &query,
      Some(limit),
      Some(offset),
      None,
      language.as_deref(),
      path_prefix.as_deref(),
    )
    .await
    .context("semantic search failed")?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
  } else {
    print_semantic_results(&result);
  }
  Ok(())
}

fn print_regex_results(result: &SearchRegexResult) {
  if result.results.is_empty() {
    println!("No matches found.");
    return;
  }
  println!("Found {} matches:\n", result.pagination.returned);
  for (i, hit) in result.results.iter().enumerate() {
    println!(
      "{}. {}:{}-{} [{}] {}",
      i + 1,
      hit.path,
      hit.start_line,
      hit.end_line,
      kind_label(&hit.kind),
      hit.symbol
    );
    println!("   {}", hit.code_preview.replace('\n', "\n   "));
    if hit.is_truncated {
      println!("   (truncated)");
    }
    println!();
  }
  if result.pagination.has_more {
    println!("More results available at offset {}.", result.pagination.next_offset);
  }
}

fn print_semantic_results(result: &SearchSemanticResult) {
  if result.results.is_empty() {
    println!("No matches found.");
    return;
  }
  println!("Found {} matches:\n", result.pagination.returned);
  for (i, hit) in result.results.iter().enumerate() {
    println!(
      "{}. {}:{}-{} [{}] {} (distance {:.4})",
      i + 1,
      hit.hit.path,
      hit.hit.start_line,
      hit.hit.end_line,
      kind_label(&hit.hit.kind),
      hit.hit.symbol,
      hit.distance
    );
    println!("   {}", hit.hit.code_preview.replace('\n', "\n   "));
    if hit.hit.is_truncated {
      println!("   (truncated)");
    }
    println!();
  }
  if result.pagination.has_more {
    println!("More results available at offset {}.", result.pagination.next_offset);
  }
}

fn kind_label(kind: &sourcelens_core::model::ChunkType) -> &'static str {
  use sourcelens_core::model::ChunkType::*;
  match kind {
    Function => "function",
    Method => "method",
    Class => "class",
    Closure => "closure",
    Trait => "trait",
    Interface => "interface",
    Enum => "enum",
    Struct => "struct",
    Module => "module",
    Header => "header",
    CodeBlock => "code_block",
    Script => "script",
    Block => "block",
  }
}
