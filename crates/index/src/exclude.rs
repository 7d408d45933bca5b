//! Include/exclude glob matching for the file watcher and initial scan.
//! Generalized from `gitignore.rs`'s per-project `GitignoreCache`, which
//! compiled patterns read out of `.gitignore`/`.git/info/exclude` files,
//! into `watch.include`/`watch.exclude` config-driven glob lists (spec.md
//! §4.1) — this system has no notion of reading the project's own
//! `.gitignore`, only the configured pattern sets. The underlying matcher
//! is still `ignore::gitignore::Gitignore`, since gitignore glob syntax
//! (doublestar, anchoring, directory-only patterns) is exactly what
//! `watch.exclude`/`watch.include` patterns need.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use sourcelens_core::config::WatchConfig;
use tracing::warn;

pub struct ExcludeMatcher {
  exclude: Gitignore,
  include: Option<Gitignore>,
}

impl ExcludeMatcher {
  /// Compile `config`'s glob lists against `root`. Malformed patterns are
  /// skipped individually (logged at warn) rather than failing the whole
  /// build, since one bad line in a long exclude list shouldn't disable
  /// exclusion entirely.
  pub fn build(root: &Path, config: &WatchConfig) -> Self {
    let exclude = Self::compile(root, &config.exclude);
    let include = if config.include.is_empty() {
      None
    } else {
      Some(Self::compile(root, &config.include))
    };
    Self { exclude, include }
  }

  fn compile(root: &Path, patterns: &[String]) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
      if let Err(err) = builder.add_line(None, pattern) {
        warn!(%pattern, %err, "skipping malformed watch glob");
      }
    }
    builder.build().unwrap_or_else(|err| {
      warn!(%err, "failed to compile watch glob set, falling back to no patterns");
      GitignoreBuilder::new(root).build().expect("empty gitignore builder always compiles")
    })
  }

  /// True if `path` (absolute, under `root`) should be dropped at ingress,
  /// per spec.md §4.1: first excluded if it matches any exclude glob; when
  /// include globs are configured, a path surviving the exclude check must
  /// also match an include glob ("include globs, when present, intersect").
  pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let is_dir = path.is_dir();

    if self.exclude.matched_path_or_any_parents(relative, is_dir).is_ignore() {
      return true;
    }
    if let Some(include) = &self.include {
      return !include.matched_path_or_any_parents(relative, is_dir).is_ignore();
    }
    false
  }
}
