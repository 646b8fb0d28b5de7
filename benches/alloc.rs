//! Allocator benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use power2_alloc::Power2Allocator;

fn bench_alloc_release_cycle(c: &mut Criterion) {
    let sizes: &[u32] = &[1, 3, 17, 100, 1024];
    let mut group = c.benchmark_group("alloc_release_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("power2", size), &size, |b, &sz| {
            let mut alloc = Power2Allocator::new(1024, 64).unwrap();
            b.iter(|| {
                let offset = alloc.allocate(sz).unwrap();
                alloc.release(criterion::black_box(offset)).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_fragmented(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented");

    group.bench_function("1000x mixed", |b| {
        b.iter(|| {
            let mut alloc = Power2Allocator::new(1024, 64).unwrap();
            let mut offsets = Vec::with_capacity(1000);
            for i in 0..1000u32 {
                if let Ok(offset) = alloc.allocate(1 + (i * 37) % 200) {
                    offsets.push(offset);
                }
                if i % 3 == 0 {
                    if let Some(offset) = offsets.pop() {
                        alloc.release(offset).unwrap();
                    }
                }
            }
            criterion::black_box(alloc);
        });
    });

    group.bench_function("make_copy", |b| {
        let mut alloc = Power2Allocator::new(1024, 64).unwrap();
        for i in 0..1000u32 {
            let _ = alloc.allocate(1 + (i * 37) % 200);
        }
        b.iter(|| criterion::black_box(alloc.make_copy()));
    });

    group.finish();
}

fn bench_reserve(c: &mut Criterion) {
    c.bench_function("reserve_release", |b| {
        let mut alloc = Power2Allocator::new(1024, 64).unwrap();
        b.iter(|| {
            alloc.reserve(5000, 77).unwrap();
            alloc.release(5000).unwrap();
        });
    });
}

criterion_group!(benches, bench_alloc_release_cycle, bench_fragmented, bench_reserve);
criterion_main!(benches);
