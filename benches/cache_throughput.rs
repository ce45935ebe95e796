use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use peekarc::cache::LruTier;
use peekarc::util::natural_cmp;

fn bench_tier_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_tier");
    for capacity in [50usize, 200, 1000] {
        group.bench_with_input(
            BenchmarkId::new("put_get_churn", capacity),
            &capacity,
            |b, &capacity| {
                let tier: LruTier<u32, Arc<Vec<u8>>> = LruTier::new("bench", capacity);
                let value = Arc::new(vec![0u8; 64]);
                let mut i = 0u32;
                b.iter(|| {
                    tier.put(i, value.clone());
                    let _ = tier.get(&(i / 2));
                    i = i.wrapping_add(1);
                });
            },
        );
    }
    group.finish();
}

fn bench_natural_sort(c: &mut Criterion) {
    let names: Vec<String> = (0..2000)
        .map(|i| format!("chapter{}/img{}.png", i % 13, 2000 - i))
        .collect();
    c.bench_function("natural_sort_2000", |b| {
        b.iter(|| {
            let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
            sorted.sort_by(|a, b| natural_cmp(a, b));
            sorted.len()
        });
    });
}

criterion_group!(benches, bench_tier_churn, bench_natural_sort);
criterion_main!(benches);
