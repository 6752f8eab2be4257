//! End-to-end build benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tempfile::TempDir;
use wikipack_bench::dump;
use wikipack_core::{BuildConfig, HtmlRenderer, Ingestor};

/// Benchmark a full build with different worker counts.
fn bench_build_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_workers");
    group.sample_size(10);

    let xml = dump(2000, 4096);
    group.throughput(Throughput::Bytes(xml.len() as u64));

    for workers in [1usize, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(workers), workers, |b, &workers| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let config = BuildConfig::new(temp_dir.path().join("out")).workers(workers);
                let summary = Ingestor::create(config, Arc::new(HtmlRenderer::new()))
                    .unwrap()
                    .ingest(xml.as_bytes(), |_, _| {})
                    .unwrap();
                black_box(summary);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_workers);
criterion_main!(benches);
