use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use interceptproxy::rate_limiter::LeakyBucket;

const CHUNK_SIZES: [u64; 4] = [64, 1_024, 16_384, 65_536];

fn consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaky_bucket_consume");
    for chunk in CHUNK_SIZES {
        group.bench_with_input(BenchmarkId::new("consume", chunk), &chunk, |b, &chunk| {
            let mut bucket = LeakyBucket::new(1 << 30);
            b.iter(|| black_box(bucket.consume(black_box(chunk))));
        });
    }
    group.finish();
}

fn consume_then_release(c: &mut Criterion) {
    c.bench_function("leaky_bucket_consume_then_release", |b| {
        let mut bucket = LeakyBucket::new(1 << 20);
        b.iter(|| {
            let granted = bucket.consume(black_box(4_096));
            bucket.release(granted / 2).unwrap();
        });
    });
}

criterion_group!(benches, consume, consume_then_release);
criterion_main!(benches);
