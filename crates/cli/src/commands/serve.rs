//! The `serve` subcommand: runs the daemon in the foreground, owning the
//! Task Coordinator and the stdio/TCP JSON-RPC server until stdin closes or
//! it's interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sourcelens_core::config::Config;
use sourcelens_daemon::{RequestHandler, SearchService, Server, TaskCoordinator, TaskCoordinatorConfig};
use sourcelens_db::ChunkStore;
use tracing::info;

use crate::logging::init_daemon_logging_with_config;

pub async fn cmd_serve(root: Option<PathBuf>, foreground: bool, tcp_port: Option<u16>) -> Result<()> {
  let root = root
    .map(Ok)
    .unwrap_or_else(std::env::current_dir)
    .context("failed to resolve project root")?
    .canonicalize()
    .context("project root does not exist")?;

  let config = Config::load(&root, None).context("failed to load configuration")?;
  let _log_guard = init_daemon_logging_with_config(foreground, &config.daemon);

  let store = Arc::new(
    ChunkStore::open(root.join(&config.db.path))
      .await
      .context("failed to open chunk store")?,
  );

  if let Err(err) = sourcelens_embedding::default_provider(&config.embedding) {
    tracing::warn!(%err, "default embedding provider is not usable; semantic search will fail until a caller selects a working provider/model");
  }

  let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
  let coordinator = Arc::new(
    TaskCoordinator::spawn(root.clone(), store.clone(), &config, TaskCoordinatorConfig::default(), shutdown_rx)
      .await
      .context("failed to start the task coordinator")?,
  );

  let search = SearchService::new(store.clone(), &config);
  let handler = Arc::new(RequestHandler::new(store, search, config.embedding.clone(), coordinator.clone()));
  let server = Server::new(handler, tcp_port);
  let server_shutdown = server.shutdown_handle();

  info!(root = %root.display(), tcp_port, "daemon serving");

  let run_result = tokio::select! {
    result = server.run() => result.context("server loop failed"),
    _ = tokio::signal::ctrl_c() => {
      info!("received interrupt, shutting down");
      server_shutdown.shutdown();
      Ok(())
    }
  };
  let _ = shutdown_tx.send(());
  drop(server);

  match Arc::into_inner(coordinator) {
    Some(coordinator) => coordinator.shutdown().await,
    None => tracing::warn!("a request was still in flight at shutdown, skipping a clean coordinator stop"),
  }

  run_result
}
