//! Natural-order comparison and sortable-key collation over catalog-sized
//! name lists.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pkgd_format::{collated, natural_cmp};
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn version_like_names(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|_| {
            format!(
                "pkg.lib.{}.{}.{}.linux.amd64",
                rng.gen_range(0..50),
                rng.gen_range(0..50),
                rng.gen_range(0..999)
            )
        })
        .collect()
}

fn bench_natural_cmp_pairwise(c: &mut Criterion) {
    let names = version_like_names(256);
    let mut group = c.benchmark_group("natural_cmp");
    group.bench_function(BenchmarkId::new("pairwise", names.len()), |b| {
        b.iter(|| {
            for pair in names.windows(2) {
                black_box(natural_cmp(&pair[0], &pair[1]));
            }
        });
    });
    group.finish();
}

fn bench_collated_sort(c: &mut Criterion) {
    let names = version_like_names(1024);
    let mut group = c.benchmark_group("collated_sort");
    group.bench_function(BenchmarkId::new("sort_by_key", names.len()), |b| {
        b.iter(|| {
            let mut keys: Vec<(Vec<u8>, &str)> =
                names.iter().map(|n| (collated(n), n.as_str())).collect();
            keys.sort_by(|a, b| a.0.cmp(&b.0));
            black_box(&keys);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_natural_cmp_pairwise, bench_collated_sort);
criterion_main!(benches);
