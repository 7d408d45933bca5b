//! Common test fixtures for daemon integration tests: an isolated project
//! directory, chunk store, indexing coordinator and search service wired
//! together the way `sourcelens serve` wires them at startup.

use std::path::PathBuf;
use std::sync::Arc;

use sourcelens_core::config::Config;
use sourcelens_daemon::SearchService;
use sourcelens_db::ChunkStore;
use sourcelens_index::{Coordinator, ExcludeMatcher};
use sourcelens_parser::default_registry;
use tempfile::TempDir;

#[allow(dead_code)]
pub struct TestProject {
  pub root: TempDir,
  pub store: Arc<ChunkStore>,
  pub coordinator: Arc<Coordinator>,
  pub search: SearchService,
}

#[allow(dead_code)]
impl TestProject {
  pub async fn new() -> Self {
    Self::build(&[]).await
  }

  pub async fn with_excludes(patterns: &[&str]) -> Self {
    Self::build(patterns).await
  }

  async fn build(extra_excludes: &[&str]) -> Self {
    let root = TempDir::new().expect("failed to create project temp dir");
    let mut config = Config::default();
    config.watch.exclude.extend(extra_excludes.iter().map(|p| p.to_string()));

    let store = Arc::new(
      ChunkStore::open(root.path().join(".sourcelens/chunks.lance"))
        .await
        .expect("failed to open chunk store"),
    );
    let matcher = ExcludeMatcher::build(root.path(), &config.watch);
    let registry = Arc::new(default_registry());
    let coordinator = Arc::new(Coordinator::spawn(
      root.path().to_path_buf(),
      store.clone(),
      registry,
      matcher,
      config.index.clone(),
    ));
    let search = SearchService::new(store.clone(), &config);

    Self { root, store, coordinator, search }
  }

  pub fn write_file(&self, relative: &str, contents: &str) -> PathBuf {
    let path = self.root.path().join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("failed to create parent dir");
    }
    std::fs::write(&path, contents).expect("failed to write test file");
    path
  }
}
