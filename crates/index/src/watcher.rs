//! Recursive file watcher (spec.md §4.1): built on `notify`, already an
//! `index` dependency, with the exclude-glob layer from `exclude.rs` and a
//! debounce window that coalesces bursts per path. No teacher file owns an
//! equivalent module (the teacher indexes via an explicit scan command, not
//! a live watch); this is new, grounded in the `notify`/`ignore` stack
//! already present in this crate's `Cargo.toml`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use sourcelens_core::config::WatchConfig;
use tokio::sync::mpsc;
use tracing::warn;

use crate::exclude::ExcludeMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Created,
  Modified,
  Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
  Changed { path: PathBuf, kind: ChangeKind },
  /// The watcher backend overflowed or needs to recover (spec.md §4.1); the
  /// Coordinator should re-walk `subtree` from scratch rather than trust
  /// any further delta events for it until the rescan completes.
  Rescan { subtree: PathBuf },
}

/// Debounced, exclude-filtered recursive file watcher. Owns the live
/// `notify::RecommendedWatcher` for as long as events are wanted; dropping
/// it stops the watch.
pub struct Watcher {
  _inner: RecommendedWatcher,
  events: mpsc::UnboundedReceiver<WatchEvent>,
}

impl Watcher {
  /// Start watching `root` recursively under `config`'s debounce and
  /// include/exclude settings.
  pub fn start(root: PathBuf, config: WatchConfig) -> notify::Result<Self> {
    let matcher = ExcludeMatcher::build(&root, &config);
    let debounce = Duration::from_millis(config.debounce_ms.max(1));

    let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
    let mut inner = notify::recommended_watcher(move |res| {
      // The notify callback runs on its own thread; forwarding is the only
      // thing it does, so it can never block on coordinator backpressure.
      let _ = raw_tx.send(res);
    })?;
    inner.watch(&root, RecursiveMode::Recursive)?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    spawn_debounce_loop(root, matcher, debounce, raw_rx, out_tx);

    Ok(Self {
      _inner: inner,
      events: out_rx,
    })
  }

  pub async fn recv(&mut self) -> Option<WatchEvent> {
    self.events.recv().await
  }
}

/// Runs on a dedicated OS thread (not a tokio task) because the upstream
/// channel is `std::sync::mpsc`, whose `recv_timeout` blocks. Coalesces raw
/// notify events into a `path -> (last_seen, kind)` map and flushes entries
/// whose age exceeds `debounce` on every wakeup.
fn spawn_debounce_loop(
  root: PathBuf,
  matcher: ExcludeMatcher,
  debounce: Duration,
  raw_rx: std::sync::mpsc::Receiver<notify::Result<Event>>,
  out_tx: mpsc::UnboundedSender<WatchEvent>,
) {
  std::thread::spawn(move || {
    let mut pending: HashMap<PathBuf, (Instant, ChangeKind)> = HashMap::new();
    let tick = debounce.clamp(Duration::from_millis(10), Duration::from_millis(100));

    loop {
      match raw_rx.recv_timeout(tick) {
        Ok(Ok(event)) => {
          if matches!(event.kind, EventKind::Other) {
            warn!("file watcher reported a backend-level event, requesting rescan");
            pending.clear();
            if out_tx.send(WatchEvent::Rescan { subtree: root.clone() }).is_err() {
              return;
            }
            continue;
          }
          let Some(kind) = classify(&event.kind) else { continue };
          for path in event.paths {
            if matcher.is_excluded(&root, &path) {
              continue;
            }
            record(&mut pending, path, kind);
          }
        }
        Ok(Err(err)) => {
          warn!(%err, "file watcher backend error, requesting rescan");
          pending.clear();
          if out_tx.send(WatchEvent::Rescan { subtree: root.clone() }).is_err() {
            return;
          }
        }
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
      }

      if flush_ready(&mut pending, debounce, &out_tx).is_err() {
        return;
      }
    }
  });
}

/// Insert or update `path`'s pending entry, honoring the "deleted always
/// wins" rule: once a path is marked deleted within a window, later
/// non-delete events for it are dropped rather than overwriting the entry.
fn record(pending: &mut HashMap<PathBuf, (Instant, ChangeKind)>, path: PathBuf, kind: ChangeKind) {
  if kind == ChangeKind::Deleted {
    pending.insert(path, (Instant::now(), ChangeKind::Deleted));
    return;
  }
  if let Some((_, ChangeKind::Deleted)) = pending.get(&path) {
    return;
  }
  pending.insert(path, (Instant::now(), kind));
}

fn flush_ready(
  pending: &mut HashMap<PathBuf, (Instant, ChangeKind)>,
  debounce: Duration,
  out_tx: &mpsc::UnboundedSender<WatchEvent>,
) -> Result<(), ()> {
  let now = Instant::now();
  let ready: Vec<PathBuf> = pending
    .iter()
    .filter(|(_, (seen, _))| now.duration_since(*seen) >= debounce)
    .map(|(path, _)| path.clone())
    .collect();

  for path in ready {
    if let Some((_, kind)) = pending.remove(&path)
      && out_tx.send(WatchEvent::Changed { path, kind }).is_err()
    {
      return Err(());
    }
  }
  Ok(())
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
  match kind {
    EventKind::Create(_) => Some(ChangeKind::Created),
    EventKind::Modify(_) => Some(ChangeKind::Modified),
    EventKind::Remove(_) => Some(ChangeKind::Deleted),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deleted_always_wins_over_later_modify_in_same_window() {
    let mut pending = HashMap::new();
    let path = PathBuf::from("src/main.rs");
    record(&mut pending, path.clone(), ChangeKind::Deleted);
    record(&mut pending, path.clone(), ChangeKind::Modified);
    assert_eq!(pending.get(&path).unwrap().1, ChangeKind::Deleted);
  }

  #[test]
  fn later_modify_overwrites_earlier_created_within_window() {
    let mut pending = HashMap::new();
    let path = PathBuf::from("src/main.rs");
    record(&mut pending, path.clone(), ChangeKind::Created);
    record(&mut pending, path.clone(), ChangeKind::Modified);
    assert_eq!(pending.get(&path).unwrap().1, ChangeKind::Modified);
  }

  #[test]
  fn flush_ready_only_emits_expired_entries() {
    let mut pending = HashMap::new();
    let stale = PathBuf::from("stale.rs");
    let fresh = PathBuf::from("fresh.rs");
    pending.insert(stale.clone(), (Instant::now() - Duration::from_millis(600), ChangeKind::Modified));
    pending.insert(fresh.clone(), (Instant::now(), ChangeKind::Modified));

    let (tx, mut rx) = mpsc::unbounded_channel();
    flush_ready(&mut pending, Duration::from_millis(500), &tx).unwrap();
    drop(tx);

    let mut emitted = Vec::new();
    while let Ok(event) = rx.try_recv() {
      emitted.push(event);
    }
    assert_eq!(emitted.len(), 1);
    assert!(matches!(&emitted[0], WatchEvent::Changed { path, .. } if path == &stale));
    assert!(pending.contains_key(&fresh));
    assert!(!pending.contains_key(&stale));
  }
}
