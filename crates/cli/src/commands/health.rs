//! The `health` subcommand: a standalone reachability check, independent of
//! any running daemon (there may not be one — `serve` is foreground-only).

use std::path::PathBuf;

use anyhow::{Context, Result};
use sourcelens_core::config::Config;
use sourcelens_db::ChunkStore;

pub async fn cmd_health(root: Option<PathBuf>) -> Result<()> {
  let root = root
    .map(Ok)
    .unwrap_or_else(std::env::current_dir)
    .context("failed to resolve project root")?
    .canonicalize()
    .context("project root does not exist")?;

  let config = Config::load(&root, None).context("failed to load configuration")?;
  let db_path = root.join(&config.db.path);

  match ChunkStore::open(&db_path).await {
    Ok(store) => match store.stats().await {
      Ok(stats) => {
        println!("OK: chunk store reachable at {}", db_path.display());
        println!("  {} files, {} chunks", stats.total_files, stats.total_chunks);
        Ok(())
      }
      Err(err) => {
        println!("DEGRADED: chunk store opened but stats query failed: {err}");
        std::process::exit(1);
      }
    },
    Err(err) => {
      println!("DOWN: could not open chunk store at {}: {err}", db_path.display());
      std::process::exit(1);
    }
  }
}
