//! Analysis Throughput Benchmarks
//!
//! Line counting and hashing over a synthetic log, fed in chunks the size
//! a request body typically arrives in.
//!
//! Run with: `cargo bench --bench analysis_throughput`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use upload_analyzer::analysis::{AnalyzerFactory, ContentAnalyzer, LineAnalyzerFactory, LineCounter};

/// Build a log of `lines` lines, every tenth one carrying an error marker
fn create_log(lines: usize) -> Vec<u8> {
    let mut log = String::new();
    for i in 0..lines {
        if i % 10 == 0 {
            log.push_str(&format!("2024-01-01T00:00:{:02} ERROR request {} failed\n", i % 60, i));
        } else {
            log.push_str(&format!("2024-01-01T00:00:{:02} INFO request {} ok\r\n", i % 60, i));
        }
    }
    log.into_bytes()
}

fn bench_line_counter(c: &mut Criterion) {
    let log = create_log(100_000);

    let mut group = c.benchmark_group("line_counter");
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Bytes(log.len() as u64));

    for chunk_size in [64usize, 4 * 1024, 64 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &chunk_size, |b, &size| {
            b.iter(|| {
                let mut counter = LineCounter::new(["ERROR", "CRITICAL"]);
                for chunk in log.chunks(size) {
                    counter.update(black_box(chunk));
                }
                counter.finish()
            })
        });
    }

    group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
    let log = create_log(100_000);
    let factory = LineAnalyzerFactory::default();

    let mut group = c.benchmark_group("line_analyzer");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(50);
    group.throughput(Throughput::Bytes(log.len() as u64));

    group.bench_function("hash_and_count_16k_chunks", |b| {
        b.iter(|| {
            let mut analyzer = factory.create();
            for chunk in log.chunks(16 * 1024) {
                analyzer.update(black_box(chunk)).unwrap();
            }
            analyzer.finish().unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_line_counter, bench_full_analysis);
criterion_main!(benches);
