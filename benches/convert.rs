//! Benchmark – chunked conversion through `charset_encoder::StreamingEncoder`
#![allow(missing_docs)]

use std::time::Duration;

use charset_encoder::{Registry, StreamingEncoder};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Mixed-script text of at least `target_units` UTF-16 code units, with
/// astral characters so odd chunk sizes split surrogate pairs.
fn make_payload(target_units: usize) -> Vec<u16> {
    let sample = "Hello, caf\u{E9} \u{4E16}\u{754C} \u{1F600} \u{20AC}5. ";
    let mut units = Vec::with_capacity(target_units + sample.len());
    while units.len() < target_units {
        units.extend(sample.encode_utf16());
    }
    units
}

fn run_chunked(registry: &Registry, encoding: &str, payload: &[u16], chunk_size: usize) -> usize {
    let converter = registry.resolve(encoding).unwrap();
    let mut stream = StreamingEncoder::new(converter);
    let mut produced = 0usize;
    for chunk in payload.chunks(chunk_size) {
        produced += stream.process_chunk(chunk).unwrap().len();
    }
    produced + stream.finish().unwrap().0.len()
}

fn bench_convert(c: &mut Criterion) {
    let registry = Registry::default();
    let payload = make_payload(64 * 1024);

    let mut group = c.benchmark_group("convert_chunked");
    group.throughput(Throughput::Elements(payload.len() as u64));

    for encoding in ["UTF8", "UnicodeLittle", "8859_1", "GB18030"] {
        for &chunk_size in &[7usize, 256, 8192] {
            group.bench_with_input(
                BenchmarkId::new(encoding, chunk_size),
                &chunk_size,
                |b, &chunk_size| {
                    b.iter(|| black_box(run_chunked(&registry, encoding, &payload, chunk_size)))
                },
            );
        }
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let registry = Registry::default();
    c.bench_function("resolve_cached_unsupported", |b| {
        b.iter(|| black_box(registry.resolve(black_box("x-unknown")).is_err()))
    });
    c.bench_function("resolve_builtin", |b| {
        b.iter(|| black_box(registry.resolve(black_box("utf-8")).is_ok()))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(5));
    targets = bench_convert, bench_resolve
}
criterion_main!(benches);
