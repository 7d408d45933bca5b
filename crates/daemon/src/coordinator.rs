//! The Task Coordinator (spec.md §4.7): owns the long-running background
//! work a daemon process does between RPC calls — watching the filesystem,
//! draining the indexing queue, and periodically sweeping for chunks still
//! missing an embedding. Grounded in `crates/daemon/src/scheduler.rs`'s
//! `tokio::select!` + `broadcast::Receiver` shutdown idiom, with the
//! teacher's interval-timer decay/session-cleanup jobs replaced by an
//! embedding backfill sweep and the teacher's `ProjectRegistry` fan-out
//! replaced by a single project per daemon process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sourcelens_core::config::Config;
use sourcelens_core::model::AnnKey;
use sourcelens_db::ChunkStore;
use sourcelens_embedding::{BatchTuning, Orchestrator};
use sourcelens_index::{ChunkStoreSink, ChunkStoreSource, Coordinator, CoordinatorStats, ExcludeMatcher, Watcher};
use sourcelens_parser::default_registry;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// A running provider tuple's embedding key, kept alongside its
/// `Orchestrator` so the backfill sweep knows which table each one writes
/// to.
struct BackfillTarget {
  key: AnnKey,
  orchestrator: Orchestrator,
}

/// `TaskCoordinator` configuration, mirroring `SchedulerConfig`'s
/// one-struct-per-job-interval shape.
#[derive(Debug, Clone)]
pub struct TaskCoordinatorConfig {
  pub backfill_interval_secs: u64,
  pub log_cleanup_interval_hours: u64,
  pub log_retention_days: u64,
}

impl Default for TaskCoordinatorConfig {
  fn default() -> Self {
    Self {
      backfill_interval_secs: 30,
      log_cleanup_interval_hours: 24,
      log_retention_days: 14,
    }
  }
}

/// Owns the file watcher, the indexing `Coordinator`, and the periodic
/// embedding backfill sweep for one project root. One instance per daemon
/// process, matching `ChunkStore`'s single-writer discipline.
pub struct TaskCoordinator {
  indexing: Arc<Coordinator>,
  watcher_task: JoinHandle<()>,
  backfill_task: JoinHandle<()>,
}

impl TaskCoordinator {
  /// Starts the watcher, the indexing coordinator, an initial full scan of
  /// `root`, and the backfill sweep, all wired to the same shutdown
  /// broadcast `lifecycle`/`server.rs` holds the sender for.
  pub async fn spawn(
    root: PathBuf,
    store: Arc<ChunkStore>,
    config: &Config,
    coordinator_config: TaskCoordinatorConfig,
    shutdown_rx: broadcast::Receiver<()>,
  ) -> Result<Self> {
    let matcher = ExcludeMatcher::build(&root, &config.watch);
    let registry = Arc::new(default_registry());

    let indexing = Arc::new(Coordinator::spawn(
      root.clone(),
      store.clone(),
      registry,
      matcher,
      config.index.clone(),
    ));
    indexing.scan_root().await;

    let mut watcher = Watcher::start(root.clone(), config.watch.clone()).map_err(sourcelens_index::IndexError::from)?;
    let watcher_indexing = indexing.clone();
    let mut watcher_shutdown = shutdown_rx.resubscribe();
    let watcher_task = tokio::spawn(async move {
      loop {
        tokio::select! {
          event = watcher.recv() => {
            match event {
              Some(sourcelens_index::WatchEvent::Changed { path, kind }) => {
                watcher_indexing.enqueue(path, kind).await;
              }
              Some(sourcelens_index::WatchEvent::Rescan { subtree }) => {
                watcher_indexing.enqueue_rescan(subtree).await;
              }
              None => {
                warn!("file watcher channel closed, stopping watch loop");
                break;
              }
            }
          }
          _ = watcher_shutdown.recv() => {
            debug!("watch loop received shutdown signal");
            break;
          }
        }
      }
    });

    let backfill_targets = build_backfill_targets(config);
    let backfill_store = store.clone();
    let backfill_interval = Duration::from_secs(coordinator_config.backfill_interval_secs.max(1));
    let mut backfill_shutdown = shutdown_rx.resubscribe();
    let backfill_task = tokio::spawn(async move {
      let mut targets = backfill_targets;
      let mut ticker = tokio::time::interval(backfill_interval);
      ticker.tick().await;
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            run_backfill_sweep(&backfill_store, &mut targets).await;
          }
          _ = backfill_shutdown.recv() => {
            debug!("backfill sweep received shutdown signal");
            break;
          }
        }
      }
    });

    Ok(Self {
      indexing,
      watcher_task,
      backfill_task,
    })
  }

  pub async fn stats(&self) -> CoordinatorStats {
    self.indexing.stats().await
  }

  /// Awaits every item enqueued so far; tests use this to observe a
  /// deterministic post-scan state rather than polling `stats()`.
  pub async fn flush(&self) {
    self.indexing.flush().await;
  }

  pub async fn shutdown(self) {
    self.watcher_task.abort();
    self.backfill_task.abort();
    let _ = self.watcher_task.await;
    let _ = self.backfill_task.await;
  }
}

/// One `Orchestrator` per configured provider tuple, the way spec.md §4.4
/// scopes a backfill pass to a single `(provider, model, dimension)` table
/// at a time. Providers that fail to construct (missing API key, etc.) are
/// logged and skipped rather than aborting startup — a daemon should still
/// serve regex search without a working embedding provider.
fn build_backfill_targets(config: &Config) -> Vec<BackfillTarget> {
  const DEFAULT_CONTEXT_LENGTH: usize = 32_768;

  let mut targets = Vec::new();
  for (name, provider_config) in &config.embedding.providers {
    let provider = match sourcelens_embedding::from_config(name, provider_config) {
      Ok(provider) => provider,
      Err(err) => {
        warn!(provider = %name, %err, "skipping embedding provider for backfill, construction failed");
        continue;
      }
    };

    let key = AnnKey {
      provider: name.clone(),
      model: provider_config.model.clone(),
      dimension: provider_config.dim,
      distance: provider_config.distance,
    };
    let tuning = BatchTuning {
      min: provider_config.batch.min,
      initial: provider_config.batch.initial,
      max: provider_config.batch.max,
      ..BatchTuning::default()
    };
    targets.push(BackfillTarget {
      key,
      orchestrator: Orchestrator::new(provider, tuning, DEFAULT_CONTEXT_LENGTH),
    });
  }
  targets
}

async fn run_backfill_sweep(store: &Arc<ChunkStore>, targets: &mut [BackfillTarget]) {
  for target in targets {
    let source = ChunkStoreSource::new(store.clone(), target.key.clone());
    let sink = ChunkStoreSink::new(store.clone(), target.key.clone());
    match target.orchestrator.run_backfill(&source, &sink).await {
      Ok(0) => {}
      Ok(n) => info!(tuple = target.key.table_name(), embedded = n, "backfill sweep embedded pending chunks"),
      Err(err) => error!(tuple = target.key.table_name(), %err, "backfill sweep failed"),
    }
  }
}
