//! Dump parsing and rendering benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use wikipack_bench::{dump, markup};
use wikipack_core::{HtmlRenderer, NamespaceFilter, RecordStream, Renderer};

/// Benchmark streaming records out of a dump.
fn bench_record_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_stream");

    for count in [100u64, 1000].iter() {
        let xml = dump(*count, 2048);
        group.throughput(Throughput::Bytes(xml.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &xml, |b, xml| {
            b.iter(|| {
                let records = RecordStream::new(black_box(xml.as_bytes()), NamespaceFilter::default())
                    .filter_map(Result::ok)
                    .count();
                black_box(records);
            });
        });
    }

    group.finish();
}

/// Benchmark wikitext to HTML rendering.
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    let renderer = HtmlRenderer::new();

    for size in [1024, 16 * 1024, 128 * 1024].iter() {
        let text = markup(*size);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| {
                let html = renderer.render(black_box(text)).unwrap();
                black_box(html);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_stream, bench_render);
criterion_main!(benches);
