//! Inode allocation and resolution under a catalog-sized population of
//! packages, exercising the `BTreeMap::range(..=x).next_back()` predecessor
//! search `resolve` relies on.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pkgd_fskit::{InodeAllocator, PackageRange};
use sha2::{Digest, Sha256};

struct BenchRange {
    pkg_hash: [u8; 32],
    start_ino: u64,
    inner_inodes: u64,
    full_name: String,
}

impl PackageRange for BenchRange {
    fn pkg_hash(&self) -> [u8; 32] {
        self.pkg_hash
    }
    fn start_ino(&self) -> u64 {
        self.start_ino
    }
    fn inner_inodes(&self) -> u64 {
        self.inner_inodes
    }
    fn full_name(&self) -> &str {
        &self.full_name
    }
}

fn populated_allocator(count: usize) -> (InodeAllocator, Vec<u64>) {
    let alloc = InodeAllocator::new();
    let mut starts = Vec::with_capacity(count);
    for i in 0..count {
        let pkg_hash: [u8; 32] = Sha256::digest(format!("pkg-{i}").as_bytes()).into();
        let name = format!("pkg{i}.core.1.0.0.linux.amd64");
        let start = alloc.allocate_or_get(pkg_hash, 8, move |start_ino| {
            Arc::new(BenchRange { pkg_hash, start_ino, inner_inodes: 8, full_name: name })
                as Arc<dyn PackageRange>
        });
        starts.push(start);
    }
    (alloc, starts)
}

fn bench_allocate_or_get_fresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_or_get");
    for &count in &[64usize, 1024, 16384] {
        group.bench_with_input(BenchmarkId::new("fresh_packages", count), &count, |b, &n| {
            b.iter(|| {
                let (alloc, starts) = populated_allocator(n);
                black_box(&alloc);
                black_box(&starts);
            });
        });
    }
    group.finish();
}

fn bench_resolve_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for &count in &[64usize, 1024, 16384] {
        let (alloc, starts) = populated_allocator(count);
        group.bench_with_input(BenchmarkId::new("by_start_ino", count), &count, |b, _| {
            b.iter(|| {
                for &start in &starts {
                    black_box(alloc.resolve(start).unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_allocate_or_get_fresh, bench_resolve_lookup);
criterion_main!(benches);
