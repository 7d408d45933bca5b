//! Benchmarks glob-matching throughput at scale, replacing the teacher's
//! `scanner_bench.rs` (which timed raw directory walks) now that exclusion
//! is a config-driven glob compile/match rather than a file scan.
//!
//! Run with: cargo bench -p sourcelens-index --bench exclude_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sourcelens_core::config::WatchConfig;
use sourcelens_index::ExcludeMatcher;
use std::hint::black_box;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_paths(root: &Path, count: usize) -> Vec<PathBuf> {
  (0..count)
    .map(|i| match i % 4 {
      0 => root.join(format!("src/module_{i}/mod.rs")),
      1 => root.join(format!("node_modules/pkg_{i}/index.js")),
      2 => root.join(format!("target/debug/build/artifact_{i}")),
      _ => root.join(format!("docs/guide_{i}.md")),
    })
    .collect()
}

fn bench_matching(c: &mut Criterion) {
  let temp = TempDir::new().unwrap();
  let config = WatchConfig::default();
  let matcher = ExcludeMatcher::build(temp.path(), &config);

  let mut group = c.benchmark_group("exclude_matching");
  for count in [100, 1_000, 10_000].iter() {
    let paths = sample_paths(temp.path(), *count);
    group.throughput(Throughput::Elements(*count as u64));
    group.bench_with_input(BenchmarkId::from_parameter(count), &paths, |b, paths| {
      b.iter(|| {
        for path in paths {
          black_box(matcher.is_excluded(temp.path(), path));
        }
      });
    });
  }
  group.finish();
}

fn bench_compile(c: &mut Criterion) {
  let temp = TempDir::new().unwrap();
  let mut group = c.benchmark_group("exclude_compile");

  for pattern_count in [10, 100, 500].iter() {
    let exclude: Vec<String> = (0..*pattern_count).map(|i| format!("**/generated_{i}/**")).collect();
    let config = WatchConfig {
      include: Vec::new(),
      exclude,
      debounce_ms: 500,
    };
    group.bench_with_input(BenchmarkId::from_parameter(pattern_count), &config, |b, config| {
      b.iter(|| black_box(ExcludeMatcher::build(temp.path(), config)));
    });
  }
  group.finish();
}

criterion_group!(benches, bench_matching, bench_compile);
criterion_main!(benches);
