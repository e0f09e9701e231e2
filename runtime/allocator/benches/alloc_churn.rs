//! Allocate/release churn benchmarks over the mock heap source

use brkheap::HeapAllocator;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use heap_source::MockHeapSource;

const MAX_HEAP: usize = 1 << 24;

fn new_heap() -> HeapAllocator<MockHeapSource> {
    HeapAllocator::new(MockHeapSource::new(), MAX_HEAP).expect("reserve failed")
}

fn bench_small_allocations(c: &mut Criterion) {
    c.bench_function("allocate_128x64", |b| {
        b.iter_batched(
            new_heap,
            |mut heap| {
                for _ in 0..128 {
                    heap.allocate(64).unwrap();
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_alloc_release_cycle(c: &mut Criterion) {
    c.bench_function("alloc_release_cycle_64", |b| {
        b.iter_batched(
            new_heap,
            |mut heap| {
                // Hot loop the recency cache is built for: free then
                // immediately re-allocate the same size
                let mut data = heap.allocate(64).unwrap();
                for _ in 0..256 {
                    unsafe { heap.release(data).unwrap() };
                    data = heap.allocate(64).unwrap();
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_first_fit_scan(c: &mut Criterion) {
    c.bench_function("first_fit_scan_deep", |b| {
        b.iter_batched(
            || {
                // A long chain of in-use blocks with one free block at the end
                let mut heap = new_heap();
                for _ in 0..511 {
                    heap.allocate(32).unwrap();
                }
                let last = heap.allocate(32).unwrap();
                unsafe { heap.release(last).unwrap() };
                // Drain the cache so the scan path is what gets measured
                for _ in 0..8 {
                    heap.allocate(32).unwrap();
                }
                heap
            },
            |mut heap| {
                heap.allocate(32).unwrap();
                heap
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_small_allocations,
    bench_alloc_release_cycle,
    bench_first_fit_scan
);
criterion_main!(benches);
