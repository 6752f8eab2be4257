//! Segment store and payload benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use wikipack_bench::{markup, payload};
use wikipack_core::{
    decode_payload, encode_payload, Compression, DirectorySegments, InMemorySegments, Location,
    SegmentId, SegmentStore,
};

/// Benchmark allocate + write into in-memory segments.
fn bench_memory_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_store_write");

    for size in [256, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = SegmentStore::new(Box::new(InMemorySegments::new()), 64 * 1024 * 1024);
            let data = payload(size);

            b.iter(|| {
                let location = store.allocate(data.len() as u64).unwrap();
                store.write(location, black_box(&data)).unwrap();
                black_box(location);
            });
        });
    }

    group.finish();
}

/// Benchmark allocate + write into segment files.
fn bench_file_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_store_write");

    // Use larger sample size for file operations
    group.sample_size(50);

    for size in [1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let store = SegmentStore::new(
                Box::new(DirectorySegments::new(temp_dir.path())),
                16 * 1024 * 1024,
            );
            let data = payload(size);

            b.iter(|| {
                let location = store.allocate(data.len() as u64).unwrap();
                store.write(location, black_box(&data)).unwrap();
            });
            store.close().unwrap();
        });
    }

    group.finish();
}

/// Benchmark payload encoding with and without gzip.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_payload");
    let document = markup(8 * 1024);
    group.throughput(Throughput::Bytes(document.len() as u64));

    for compression in [Compression::None, Compression::Gzip] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{compression:?}")),
            &compression,
            |b, &compression| {
                b.iter(|| {
                    let bytes = encode_payload("Benchmark", black_box(&document), compression).unwrap();
                    black_box(bytes);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark payload decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_payload");
    let document = markup(8 * 1024);

    for compression in [Compression::None, Compression::Gzip] {
        let bytes = encode_payload("Benchmark", &document, compression).unwrap();
        let location = Location::new(SegmentId::new(0), 0, bytes.len() as u64);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{compression:?}")),
            &bytes,
            |b, bytes| {
                b.iter(|| {
                    let page = decode_payload(black_box(bytes), compression, location).unwrap();
                    black_box(page);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_memory_store, bench_file_store, bench_encode, bench_decode);
criterion_main!(benches);
