extern crate codec_bench;

use std::io::Cursor;

use codec_bench::partition::classify;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{distributions::Uniform, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

// a synthetic query log with 1 to 8 terms per query
fn query_log(queries: usize) -> String {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1337);
    let lengths = Uniform::new_inclusive(1, 8);
    let terms = Uniform::new(0u32, 1 << 24);
    let mut log = String::new();
    for _ in 0..queries {
        let len = rng.sample(lengths);
        let query: Vec<String> = (0..len).map(|_| rng.sample(terms).to_string()).collect();
        log.push_str(&query.join(" "));
        log.push('\n');
    }
    log
}

fn classify_vary_n(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition::classify_varying_n");
    for n in [10_000, 100_000] {
        let log = query_log(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &log, |b, log| {
            b.iter(|| classify(Cursor::new(black_box(log.as_bytes()))))
        });
    }
}

fn shuffle_vary_n(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition::shuffle_varying_n");
    for n in [10_000, 100_000] {
        // classify outside of the shuffle benchmark
        let buckets = classify(Cursor::new(query_log(n))).expect("in-memory log");
        group.bench_with_input(BenchmarkId::from_parameter(n), &buckets, |b, buckets| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(13);
            b.iter(|| {
                let mut shuffled = buckets.clone();
                shuffled.shuffle(&mut rng);
                shuffled
            })
        });
    }
}

criterion_group!(benches, classify_vary_n, shuffle_vary_n);
criterion_main!(benches);
