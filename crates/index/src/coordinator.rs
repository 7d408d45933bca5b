//! The Indexing Coordinator (spec.md §4.3): the debounced watch -> parse ->
//! diff -> commit pipeline's single-consumer side. `enqueue` is the only
//! entry point a watcher or initial scan may use, and it rejects excluded
//! paths itself rather than trusting the caller to have already filtered —
//! the bug class this guards against is a scan or rescan path bypassing
//! exclusion because it was added after the watcher's own filter was
//! written. `process_file` is reasserted as the sole unit of atomic work;
//! nothing else in this crate writes to the Chunk Store.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sourcelens_core::compute_content_hash;
use sourcelens_core::config::IndexConfig;
use sourcelens_core::model::{AnnKey, Chunk, File, Language};
use sourcelens_db::ChunkStore;
use sourcelens_parser::ExtractorRegistry;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{IndexError, Result};
use crate::exclude::ExcludeMatcher;
use crate::watcher::ChangeKind;

const MAX_COMMIT_ATTEMPTS: u32 = 5;
const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

enum QueueItem {
  Event { path: PathBuf, kind: ChangeKind },
  Rescan { subtree: PathBuf },
  Flush(oneshot::Sender<()>),
}

/// Bounded FIFO with spec.md §4.3's backpressure policy: when full, the
/// oldest droppable (`Created`/`Modified`) entry is evicted to make room;
/// `Deleted` events and flush markers are never dropped, so the queue can
/// briefly exceed `capacity` rather than lose a deletion.
struct WorkQueue {
  items: Mutex<VecDeque<QueueItem>>,
  capacity: usize,
  notify: Notify,
}

impl WorkQueue {
  fn new(capacity: usize) -> Self {
    Self {
      items: Mutex::new(VecDeque::new()),
      capacity,
      notify: Notify::new(),
    }
  }

  async fn push(&self, item: QueueItem) {
    let mut items = self.items.lock().await;
    if items.len() >= self.capacity {
      let droppable = items
        .iter()
        .position(|i| matches!(i, QueueItem::Event { kind: ChangeKind::Created | ChangeKind::Modified, .. }));
      match droppable {
        Some(pos) => {
          items.remove(pos);
        }
        None => warn!(len = items.len(), "queue full of non-droppable events, growing past capacity"),
      }
    }
    items.push_back(item);
    drop(items);
    self.notify.notify_one();
  }

  async fn pop(&self) -> QueueItem {
    loop {
      {
        let mut items = self.items.lock().await;
        if let Some(item) = items.pop_front() {
          return item;
        }
      }
      self.notify.notified().await;
    }
  }

  async fn len(&self) -> usize {
    self.items.lock().await.len()
  }
}

/// spec.md §4.7's exposed metrics: `{queued, in_flight, completed, failed,
/// last_error, running}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorStats {
  pub queued: usize,
  pub in_flight: usize,
  pub completed: u64,
  pub failed: u64,
  pub last_error: Option<String>,
  pub running: bool,
}

#[derive(Default)]
struct CoordinatorMetrics {
  in_flight: AtomicBool,
  completed: AtomicU64,
  failed: AtomicU64,
  last_error: StdMutex<Option<String>>,
}

impl CoordinatorMetrics {
  fn record_success(&self) {
    self.completed.fetch_add(1, Ordering::Relaxed);
  }

  fn record_failure(&self, message: String) {
    self.failed.fetch_add(1, Ordering::Relaxed);
    *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
  }
}

/// Owns the single-consumer queue and the background worker task that
/// drains it. Cloning is not supported — there is exactly one Coordinator
/// per Chunk Store, matching the single-writer discipline `ChunkStore`
/// itself enforces.
pub struct Coordinator {
  queue: Arc<WorkQueue>,
  root: PathBuf,
  matcher: Arc<ExcludeMatcher>,
  metrics: Arc<CoordinatorMetrics>,
  worker: JoinHandle<()>,
}

impl Coordinator {
  pub fn spawn(
    root: PathBuf,
    store: Arc<ChunkStore>,
    registry: Arc<ExtractorRegistry>,
    matcher: ExcludeMatcher,
    index_config: IndexConfig,
  ) -> Self {
    let matcher = Arc::new(matcher);
    let queue = Arc::new(WorkQueue::new(index_config.queue_capacity.max(1)));
    let metrics = Arc::new(CoordinatorMetrics::default());

    let worker_queue = queue.clone();
    let worker_root = root.clone();
    let worker_matcher = matcher.clone();
    let worker_metrics = metrics.clone();
    let worker = tokio::spawn(run_worker(
      worker_root,
      store,
      registry,
      worker_matcher,
      index_config,
      worker_queue,
      worker_metrics,
    ));

    Self {
      queue,
      root,
      matcher,
      metrics,
      worker,
    }
  }

  pub async fn stats(&self) -> CoordinatorStats {
    CoordinatorStats {
      queued: self.queue.len().await,
      in_flight: self.metrics.in_flight.load(Ordering::Relaxed) as usize,
      completed: self.metrics.completed.load(Ordering::Relaxed),
      failed: self.metrics.failed.load(Ordering::Relaxed),
      last_error: self.metrics.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone(),
      running: !self.worker.is_finished(),
    }
  }

  /// spec.md §4.3 `enqueue(path, kind)`. Non-blocking: excluded paths are
  /// dropped here rather than merely inside `process_file`, so a rescan or
  /// initial walk that forgets to pre-filter still can't slip one through.
  pub async fn enqueue(&self, path: PathBuf, kind: ChangeKind) {
    if self.matcher.is_excluded(&self.root, &path) {
      debug!(?path, "enqueue rejected excluded path");
      return;
    }
    self.queue.push(QueueItem::Event { path, kind }).await;
  }

  /// Re-walk `subtree` from scratch, re-enqueuing every surviving file.
  /// Used both for the initial scan of `root` and for watcher-reported
  /// overflow/backend-error recovery.
  pub async fn enqueue_rescan(&self, subtree: PathBuf) {
    self.queue.push(QueueItem::Rescan { subtree }).await;
  }

  pub async fn scan_root(&self) {
    self.enqueue_rescan(self.root.clone()).await;
  }

  /// spec.md §4.3 `flush()`: await until every item enqueued so far has
  /// been processed. For tests — callers don't need it in steady-state
  /// operation.
  pub async fn flush(&self) {
    let (tx, rx) = oneshot::channel();
    self.queue.push(QueueItem::Flush(tx)).await;
    let _ = rx.await;
  }

  pub async fn shutdown(self) {
    self.worker.abort();
  }
}

async fn run_worker(
  root: PathBuf,
  store: Arc<ChunkStore>,
  registry: Arc<ExtractorRegistry>,
  matcher: Arc<ExcludeMatcher>,
  index_config: IndexConfig,
  queue: Arc<WorkQueue>,
  metrics: Arc<CoordinatorMetrics>,
) {
  loop {
    match queue.pop().await {
      QueueItem::Event { path, kind: _ } => {
        handle_one(&root, &store, &registry, &matcher, &index_config, &metrics, &path).await;
      }
      QueueItem::Rescan { subtree } => {
        // Walked and processed here, in line, rather than re-enqueued as
        // `Event`s: a `Flush` pushed right after `scan_root`/`enqueue_rescan`
        // must not observe the queue as drained until every file the walk
        // finds has actually been committed, and re-enqueueing would leave
        // those `Event`s behind an already-queued `Flush`.
        match walk_subtree(&subtree).await {
          Ok(paths) => {
            for path in paths {
              if matcher.is_excluded(&root, &path) {
                continue;
              }
              handle_one(&root, &store, &registry, &matcher, &index_config, &metrics, &path).await;
            }
          }
          Err(err) => error!(%err, subtree = %subtree.display(), "rescan failed"),
        }
      }
      QueueItem::Flush(reply) => {
        let _ = reply.send(());
      }
    }
  }
}

async fn handle_one(
  root: &Path,
  store: &Arc<ChunkStore>,
  registry: &Arc<ExtractorRegistry>,
  matcher: &Arc<ExcludeMatcher>,
  index_config: &IndexConfig,
  metrics: &Arc<CoordinatorMetrics>,
  path: &Path,
) {
  metrics.in_flight.store(true, Ordering::Relaxed);
  let result = process_with_retry(root, store, registry, matcher, index_config, path).await;
  metrics.in_flight.store(false, Ordering::Relaxed);
  match result {
    Ok(()) => metrics.record_success(),
    Err(err) => {
      error!(?path, %err, "giving up on file after exhausting retries");
      metrics.record_failure(err.to_string());
    }
  }
}

/// Runs `process_file` in its own task so a panic inside parsing or chunk
/// conversion surfaces as a `JoinError` rather than taking the worker loop
/// down with it, then applies spec.md §4.3's retry policy: parser hard
/// errors leave the `File` row untouched and are retried on the next
/// change event (not here); database errors mid-commit retry in place with
/// exponential backoff (250ms base, 30s cap, 5 attempts).
async fn process_with_retry(
  root: &Path,
  store: &Arc<ChunkStore>,
  registry: &Arc<ExtractorRegistry>,
  matcher: &Arc<ExcludeMatcher>,
  index_config: &IndexConfig,
  path: &Path,
) -> Result<()> {
  let mut attempt = 0u32;
  let mut backoff = BACKOFF_BASE;

  loop {
    attempt += 1;
    let task_store = store.clone();
    let task_registry = registry.clone();
    let task_matcher = matcher.clone();
    let task_root = root.to_path_buf();
    let task_path = path.to_path_buf();
    let max_file_size = index_config.max_file_size;
    let languages = index_config.languages.clone();

    let handle = tokio::spawn(async move {
      process_file(&task_root, &task_store, &task_registry, &task_matcher, max_file_size, languages.as_deref(), &task_path).await
    });

    match handle.await {
      Ok(Ok(())) => return Ok(()),
      Ok(Err(IndexError::Db(db_err))) if attempt < MAX_COMMIT_ATTEMPTS => {
        warn!(?path, attempt, %db_err, "commit failed, retrying with backoff");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(BACKOFF_CAP);
      }
      Ok(Err(IndexError::Parser(parser_err))) => {
        warn!(?path, %parser_err, "parser error, file row kept as-is, will retry on the next change event");
        return Ok(());
      }
      Ok(Err(other)) => return Err(other),
      Err(join_err) => {
        error!(?path, %join_err, "file processing task panicked, queue continues");
        return Ok(());
      }
    }
  }
}

/// The atomic unit of work spec.md §4.3 names `process_file`: resolve
/// language, stat, hash-check for a no-op, parse, diff against the
/// existing chunk set, and commit kept/removed/added in a single
/// transaction.
async fn process_file(
  root: &Path,
  store: &ChunkStore,
  registry: &ExtractorRegistry,
  matcher: &ExcludeMatcher,
  max_file_size: u64,
  languages: Option<&[String]>,
  path: &Path,
) -> Result<()> {
  let path_str = path.to_string_lossy().to_string();

  // Step 1: resolve language. Excluded, unrecognized by extension, not
  // registered in `registry` (a tier2/tier3 language `Language::from_extension`
  // resolves but no extractor was built for), or outside the configured
  // language allowlist all collapse to the same "treat as absent" handling a
  // genuine deletion gets.
  let excluded = matcher.is_excluded(root, path);
  let language = path
    .extension()
    .and_then(|e| e.to_str())
    .and_then(Language::from_extension)
    .filter(|lang| registry.supports(*lang))
    .filter(|lang| languages.is_none_or(|allowed| allowed.iter().any(|l| l == lang.as_str())));

  if excluded || language.is_none() {
    remove_file_row(store, &path_str).await?;
    return Ok(());
  }
  let language = language.unwrap();

  // Step 2: stat.
  let metadata = match tokio::fs::metadata(path).await {
    Ok(metadata) => metadata,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
      remove_file_row(store, &path_str).await?;
      return Ok(());
    }
    Err(err) => return Err(err.into()),
  };
  if !metadata.is_file() {
    return Ok(());
  }
  if metadata.len() > max_file_size {
    warn!(?path, size = metadata.len(), max_file_size, "file exceeds configured max size, skipping");
    return Ok(());
  }
  let mtime: DateTime<Utc> = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());

  // Step 3: read, hash, no-op check.
  let bytes = match tokio::fs::read(path).await {
    Ok(bytes) => bytes,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
      remove_file_row(store, &path_str).await?;
      return Ok(());
    }
    Err(err) => return Err(err.into()),
  };
  let Ok(source) = String::from_utf8(bytes) else {
    warn!(?path, "file is not valid utf-8, skipping");
    return Ok(());
  };
  let content_hash = compute_content_hash(&source);

  let existing_file = store.get_file_by_path(&path_str).await?;
  if let Some(existing) = &existing_file
    && existing.content_hash == content_hash
    && existing.mtime == mtime
  {
    return Ok(());
  }

  // Step 4: parse. `ParserError::UnsupportedLanguage` can't happen here
  // since step 1 already resolved `language`; `ParseError` soft errors
  // ride along in the outcome and are logged, not raised.
  let outcome = registry.parse(language, &source)?;
  for soft_error in &outcome.soft_errors {
    warn!(?path, %soft_error, "soft parser error, affected chunk dropped");
  }

  let file_id = existing_file.as_ref().map(|f| f.id).unwrap_or_else(Uuid::now_v7);

  // Step 5: drafts -> chunks, dropping anything that parsed to nothing but
  // whitespace (spec.md's empty-chunk edge case).
  let new_chunks: Vec<Chunk> = outcome
    .chunks
    .into_iter()
    .filter(|draft| !draft.code.trim().is_empty())
    .map(|draft| Chunk {
      id: Uuid::now_v7(),
      file_id,
      symbol: draft.symbol,
      start_line: draft.start_line,
      end_line: draft.end_line,
      kind: draft.kind,
      content_hash: compute_content_hash(&draft.code),
      code: draft.code,
      language,
    })
    .collect();

  // Step 6: commit. `upsert_file` then `replace_chunks` — both single
  // LanceDB `.add()`/`.delete()`/`.update()` calls, no partial writes
  // visible to a reader in between.
  let file_row = File {
    id: file_id,
    path: path_str.clone(),
    language,
    mtime,
    content_hash,
  };
  store.upsert_file(&file_row).await?;
  let diff = store.replace_chunks(file_id, new_chunks).await?;

  if !diff.removed.is_empty() {
    cascade_delete_embeddings(store, &diff.removed).await?;
  }

  // Step 7: chunks newly added are implicitly pending for every tuple —
  // the Chunk Store itself is the pending-embedding set the Embedding
  // Orchestrator's `ChunkStoreSource` reads from, so there's nothing
  // further to enqueue here.
  debug!(
    ?path,
    kept = diff.kept.len(),
    removed = diff.removed.len(),
    added = diff.added.len(),
    "file committed"
  );

  Ok(())
}

async fn remove_file_row(store: &ChunkStore, path: &str) -> Result<()> {
  let removed = store.delete_file(path).await?;
  if !removed.is_empty() {
    cascade_delete_embeddings(store, &removed).await?;
  }
  Ok(())
}

async fn cascade_delete_embeddings(store: &ChunkStore, chunk_ids: &[Uuid]) -> Result<()> {
  for table_name in store.known_embedding_tuples().await? {
    if let Some(key) = parse_tuple_table_name(&table_name) {
      store.delete_embeddings(&key, chunk_ids).await?;
    }
  }
  Ok(())
}

/// Best-effort reconstruction of an `AnnKey` from its table name
/// (`embeddings_{provider}_{model}_{dimension}`). Distance metric isn't
/// encoded in the table name and doesn't affect which table
/// `delete_embeddings` opens, so it's filled with a placeholder. Assumes
/// `provider` has no underscores, true of every provider this system
/// ships (`ollama`, `openrouter`).
fn parse_tuple_table_name(table_name: &str) -> Option<AnnKey> {
  let rest = table_name.strip_prefix("embeddings_")?;
  let (head, dim_str) = rest.rsplit_once('_')?;
  let dimension = dim_str.parse::<usize>().ok()?;
  let (provider, model) = head.split_once('_')?;
  Some(AnnKey {
    provider: provider.to_string(),
    model: model.to_string(),
    dimension,
    distance: sourcelens_core::model::DistanceMetric::Cosine,
  })
}

/// Re-walk `subtree`, enqueuing every file that survives exclusion.
/// `ignore::WalkBuilder` is synchronous, so the walk itself runs on the
/// blocking thread pool; only the per-file `queue.push` calls are async.
async fn walk_subtree(subtree: &Path) -> Result<Vec<PathBuf>> {
  let subtree_owned = subtree.to_path_buf();
  tokio::task::spawn_blocking(move || {
    ignore::WalkBuilder::new(&subtree_owned)
      .hidden(false)
      .git_ignore(false)
      .git_exclude(false)
      .build()
      .filter_map(|entry| entry.ok())
      .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
      .map(|entry| entry.into_path())
      .collect::<Vec<_>>()
  })
  .await
  .map_err(|_| IndexError::QueueClosed)
}

#[cfg(test)]
mod tests {
  use super::*;
  use sourcelens_core::config::Config;
  use sourcelens_parser::default_registry;
  use std::time::Duration as StdDuration;
  use tempfile::TempDir;

  async fn new_coordinator(root: &Path) -> (Coordinator, Arc<ChunkStore>) {
    let db_dir = TempDir::new().unwrap();
    let store = Arc::new(ChunkStore::open(db_dir.path().join("t.lance")).await.unwrap());
    let registry = Arc::new(default_registry());
    let config = Config::default();
    let matcher = ExcludeMatcher::build(root, &config.watch);
    let coordinator = Coordinator::spawn(root.to_path_buf(), store.clone(), registry, matcher, config.index);
    (coordinator, store)
  }

  #[tokio::test]
  async fn enqueue_and_flush_commits_a_new_file() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("lib.rs"), "fn hello() {}\n").unwrap();

    let (coordinator, store) = new_coordinator(root.path()).await;
    coordinator.enqueue(root.path().join("lib.rs"), ChangeKind::Created).await;
    coordinator.flush().await;

    let path_str = root.path().join("lib.rs").to_string_lossy().to_string();
    let file = store.get_file_by_path(&path_str).await.unwrap();
    assert!(file.is_some());
    let chunks = store.get_chunks_for_file_id(file.unwrap().id).await.unwrap();
    assert!(!chunks.is_empty());
  }

  #[tokio::test]
  async fn enqueue_rejects_excluded_paths_before_queueing() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("node_modules/pkg")).unwrap();
    std::fs::write(root.path().join("node_modules/pkg/index.js"), "module.exports = {}").unwrap();

    let (coordinator, store) = new_coordinator(root.path()).await;
    coordinator
      .enqueue(root.path().join("node_modules/pkg/index.js"), ChangeKind::Created)
      .await;
    coordinator.flush().await;

    assert!(store.list_files().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn deleting_a_file_cascades_its_chunks() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("lib.rs");
    std::fs::write(&target, "fn hello() {}\n").unwrap();

    let (coordinator, store) = new_coordinator(root.path()).await;
    coordinator.enqueue(target.clone(), ChangeKind::Created).await;
    coordinator.flush().await;

    std::fs::remove_file(&target).unwrap();
    coordinator.enqueue(target.clone(), ChangeKind::Deleted).await;
    coordinator.flush().await;

    let path_str = target.to_string_lossy().to_string();
    assert!(store.get_file_by_path(&path_str).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn reprocessing_unchanged_content_is_a_noop() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("lib.rs");
    std::fs::write(&target, "fn hello() {}\n").unwrap();

    let (coordinator, store) = new_coordinator(root.path()).await;
    coordinator.enqueue(target.clone(), ChangeKind::Created).await;
    coordinator.flush().await;
    let path_str = target.to_string_lossy().to_string();
    let first = store.get_file_by_path(&path_str).await.unwrap().unwrap();

    coordinator.enqueue(target.clone(), ChangeKind::Modified).await;
    coordinator.flush().await;
    let second = store.get_file_by_path(&path_str).await.unwrap().unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.content_hash, second.content_hash);
  }

  #[tokio::test]
  async fn scan_root_then_flush_waits_for_every_discovered_file() {
    let root = TempDir::new().unwrap();
    for i in 0..5 {
      std::fs::write(root.path().join(format!("m{i}.rs")), format!("fn f{i}() {{}}\n")).unwrap();
    }

    let (coordinator, store) = new_coordinator(root.path()).await;
    coordinator.scan_root().await;
    coordinator.flush().await;

    assert_eq!(store.list_files().await.unwrap().len(), 5);
  }

  #[tokio::test]
  async fn work_queue_drops_oldest_modified_before_deleted() {
    let queue = WorkQueue::new(2);
    queue
      .push(QueueItem::Event {
        path: PathBuf::from("a.rs"),
        kind: ChangeKind::Modified,
      })
      .await;
    queue
      .push(QueueItem::Event {
        path: PathBuf::from("b.rs"),
        kind: ChangeKind::Deleted,
      })
      .await;
    queue
      .push(QueueItem::Event {
        path: PathBuf::from("c.rs"),
        kind: ChangeKind::Modified,
      })
      .await;

    let first = tokio::time::timeout(StdDuration::from_millis(50), queue.pop()).await.unwrap();
    let second = tokio::time::timeout(StdDuration::from_millis(50), queue.pop()).await.unwrap();
    assert!(matches!(&first, QueueItem::Event { path, .. } if path == &PathBuf::from("b.rs")));
    assert!(matches!(&second, QueueItem::Event { path, .. } if path == &PathBuf::from("c.rs")));
  }

  #[tokio::test]
  async fn a_language_resolvable_by_extension_but_not_registered_is_treated_as_absent() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("worker.scala"), "object Worker {}\n").unwrap();

    let (coordinator, store) = new_coordinator(root.path()).await;
    coordinator.enqueue(root.path().join("worker.scala"), ChangeKind::Created).await;
    coordinator.flush().await;

    assert!(store.list_files().await.unwrap().is_empty());
  }

  #[test]
  fn parses_tuple_table_name_back_into_an_ann_key() {
    let key = parse_tuple_table_name("embeddings_ollama_qwen3-embedding_1024").unwrap();
    assert_eq!(key.provider, "ollama");
    assert_eq!(key.model, "qwen3-embedding");
    assert_eq!(key.dimension, 1024);
  }
}
