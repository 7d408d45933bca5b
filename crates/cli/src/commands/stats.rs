//! The `stats` subcommand: point-in-time Chunk Store statistics.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sourcelens_core::config::Config;
use sourcelens_db::ChunkStore;

pub async fn cmd_stats(root: Option<PathBuf>, json: bool) -> Result<()> {
  let root = root
    .map(Ok)
    .unwrap_or_else(std::env::current_dir)
    .context("failed to resolve project root")?
    .canonicalize()
    .context("project root does not exist")?;

  let config = Config::load(&root, None).context("failed to load configuration")?;
  let store = ChunkStore::open(root.join(&config.db.path))
    .await
    .context("failed to open chunk store")?;
  let stats = store.stats().await.context("failed to read chunk store stats")?;

  if json {
    println!("{}", serde_json::to_string_pretty(&stats)?);
    return Ok(());
  }

  println!("Files:  {}", stats.total_files);
  println!("Chunks: {}", stats.total_chunks);

  if !stats.chunks_by_language.is_empty() {
    println!("\nChunks by language:");
    let mut languages: Vec<_> = stats.chunks_by_language.iter().collect();
    languages.sort_by(|a, b| b.1.cmp(a.1));
    for (language, count) in languages {
      println!("  {language:<12} {count}");
    }
  }

  if !stats.embeddings_by_tuple.is_empty() {
    println!("\nEmbeddings by provider/model/dimension:");
    for (tuple, count) in &stats.embeddings_by_tuple {
      let pending = stats.pending_by_tuple.get(tuple).copied().unwrap_or(0);
      println!("  {tuple:<40} {count} embedded, {pending} pending");
    }
  }

  Ok(())
}
