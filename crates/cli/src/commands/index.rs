//! One-shot indexing of a project root, without starting the long-running daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sourcelens_core::config::Config;
use sourcelens_db::ChunkStore;
use sourcelens_index::{Coordinator, ExcludeMatcher};
use sourcelens_parser::default_registry;
use tracing::info;

pub async fn cmd_index(root: Option<PathBuf>) -> Result<()> {
  let root = root
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

  let matcher = ExcludeMatcher::build(&root, &config.watch);
  let registry = Arc::new(default_registry());

  let coordinator = Arc::new(Coordinator::spawn(
    root.clone(),
    store.clone(),
    registry,
    matcher,
    config.index.clone(),
  ));
  coordinator.scan_root().await;
  coordinator.flush().await;

  let stats = coordinator.stats().await;
  let store_stats = store.stats().await.context("failed to read chunk store stats")?;
  info!(
    files = store_stats.total_files,
    chunks = store_stats.total_chunks,
    failed = stats.failed,
    "indexing complete"
  );
  println!(
    "Indexed {} files, {} chunks ({} failed)",
    store_stats.total_files, store_stats.total_chunks, stats.failed
  );
  if let Some(ref err) = stats.last_error {
    println!("Last error: {err}");
  }

  Ok(())
}
