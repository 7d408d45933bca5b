//! Benchmarks for embedding batch performance.
//!
//! 1. Sequential embed() calls vs embed_batch() (semaphore-parallel)
//! 2. Throughput across a range of batch sizes
//! 3. Single embed() latency at a few content sizes
//!
//! REQUIRES: Ollama running locally with an embedding model pulled.
//!
//! Run with: cargo bench -p sourcelens-embedding --bench batch_embed_bench

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sourcelens_embedding::{EmbeddingMode, EmbeddingProvider, OllamaProvider};

fn generate_code_chunks(count: usize) -> Vec<String> {
  (0..count)
    .map(|i| {
      format!(
        r#"/// Function {i} documentation
pub fn function_{i}(arg: i32) -> Result<i32, Error> {{
    let result = arg * 2;
    if result > 100 {{
        return Err(Error::TooLarge);
    }}
    Ok(result)
}}"#
      )
    })
    .collect()
}

fn bench_sequential_vs_batch(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let provider = OllamaProvider::new();

  if !rt.block_on(provider.check_health()).available {
    eprintln!("Ollama not available - skipping embedding benchmarks");
    return;
  }

  let mut group = c.benchmark_group("sequential_vs_batch");
  group.sample_size(10); // network latency means few samples

  for count in [5, 10, 20] {
    let chunks = generate_code_chunks(count);
    group.throughput(Throughput::Elements(count as u64));

    group.bench_with_input(BenchmarkId::new("sequential", count), &chunks, |b, chunks| {
      b.iter(|| {
        rt.block_on(async {
          let mut results = Vec::with_capacity(chunks.len());
          for chunk in chunks {
            results.push(provider.embed(black_box(chunk), EmbeddingMode::Document).await.unwrap());
          }
          results
        })
      });
    });

    group.bench_with_input(BenchmarkId::new("batch_parallel", count), &chunks, |b, chunks| {
      let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
      b.iter(|| rt.block_on(async { provider.embed_batch(black_box(&refs), EmbeddingMode::Document).await.unwrap() }));
    });
  }

  group.finish();
}

fn bench_batch_sizes(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let provider = OllamaProvider::new();

  if !rt.block_on(provider.check_health()).available {
    eprintln!("Ollama not available - skipping batch size benchmarks");
    return;
  }

  let mut group = c.benchmark_group("batch_sizes");
  group.sample_size(10);

  for count in [10, 25, 50, 100] {
    let chunks = generate_code_chunks(count);
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    group.throughput(Throughput::Elements(count as u64));

    group.bench_with_input(BenchmarkId::from_parameter(count), &refs, |b, refs| {
      b.iter(|| rt.block_on(async { provider.embed_batch(black_box(refs), EmbeddingMode::Document).await.unwrap() }));
    });
  }

  group.finish();
}

fn bench_single_embed_latency(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let provider = OllamaProvider::new();

  if !rt.block_on(provider.check_health()).available {
    eprintln!("Ollama not available - skipping latency benchmark");
    return;
  }

  let mut group = c.benchmark_group("single_embed_latency");
  group.sample_size(20);

  let short_content = "fn foo() {}".to_string();
  let medium_content = generate_code_chunks(1).pop().unwrap();
  let long_content = (0..10).map(|i| format!("pub fn function_{i}(x: i32) -> i32 {{ x * {} }}\n", i + 1)).collect::<String>();

  for (label, content) in [("short", &short_content), ("medium", &medium_content), ("long", &long_content)] {
    group.bench_function(label, |b| {
      b.iter(|| rt.block_on(async { provider.embed(black_box(content), EmbeddingMode::Document).await.unwrap() }));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_sequential_vs_batch, bench_batch_sizes, bench_single_embed_latency);
criterion_main!(benches);
