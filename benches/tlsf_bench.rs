//! Benchmarks over the TLSF allocator and the dynamic view containers built
//! on top of it — allocate/free churn, reallocate-driven growth, and the
//! hashmap/array/sparse-set hot paths spec.md §8 exercises functionally.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nebula_memory::tlsf::TlsfAllocator;
use nebula_memory::view::{ArrayView, MapView, SparseSetView};

fn fresh_allocator(size: usize) -> TlsfAllocator {
    TlsfAllocator::new(vec![0u8; size]).unwrap()
}

fn bench_allocate_free_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_free_churn");
    group.throughput(Throughput::Elements(1));

    group.bench_function("alloc_then_free_64b", |b| {
        let mut allocator = fresh_allocator(1 << 20);
        b.iter(|| {
            let p = allocator.allocate(64, 0, None).unwrap();
            black_box(p);
            allocator.free(p);
        });
    });

    group.bench_function("alloc_free_varied_sizes", |b| {
        let mut allocator = fresh_allocator(1 << 20);
        let sizes = [16u32, 48, 96, 256, 512];
        b.iter(|| {
            let mut ptrs = Vec::with_capacity(sizes.len());
            for &size in &sizes {
                ptrs.push(allocator.allocate(size, 0, None).unwrap());
            }
            for p in ptrs {
                allocator.free(black_box(p));
            }
        });
    });

    group.finish();
}

fn bench_reallocate_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("reallocate_growth");
    group.throughput(Throughput::Elements(1));

    group.bench_function("grow_in_place_when_right_neighbor_is_free", |b| {
        let mut allocator = fresh_allocator(1 << 20);
        b.iter(|| {
            let p = allocator.allocate(32, 0, None).unwrap();
            let grown = allocator.reallocate(p, 96, 0, None).unwrap();
            black_box(grown);
            allocator.free(grown);
        });
    });

    group.finish();
}

fn bench_dynamic_array_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_array");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("push_1000_u32", |b| {
        b.iter(|| {
            let mut allocator = fresh_allocator(1 << 20);
            let control = allocator.allocate(4, 0, None).unwrap();
            let mut arr = ArrayView::new(&mut allocator, control, control, 4);
            for i in 0..1000u32 {
                arr.push_u32(black_box(i));
            }
        });
    });

    group.finish();
}

fn bench_map_insert_and_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_map");
    group.throughput(Throughput::Elements(500));

    group.bench_function("insert_500_string_keys", |b| {
        b.iter(|| {
            let mut allocator = fresh_allocator(1 << 21);
            let control = allocator.allocate(4, 0, None).unwrap();
            let mut map = MapView::new(&mut allocator, control, control, 0, 4);
            for i in 0..500u32 {
                map.set_u32(format!("key-{i}").as_bytes(), i);
            }
            black_box(map.len());
        });
    });

    group.bench_function("lookup_500_string_keys", |b| {
        let mut allocator = fresh_allocator(1 << 21);
        let control = allocator.allocate(4, 0, None).unwrap();
        let mut map = MapView::new(&mut allocator, control, control, 0, 4);
        for i in 0..500u32 {
            map.set_u32(format!("key-{i}").as_bytes(), i);
        }
        b.iter(|| {
            for i in 0..500u32 {
                black_box(map.get_u32(format!("key-{i}").as_bytes()));
            }
        });
    });

    group.finish();
}

fn bench_sparse_set_add_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_set");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("add_then_swap_remove_half", |b| {
        b.iter(|| {
            let mut allocator = fresh_allocator(1 << 20);
            let control = allocator.allocate(4, 0, None).unwrap();
            let mut set = SparseSetView::new(&mut allocator, control, control);
            for id in 0..1000u32 {
                set.add(id);
            }
            for id in (0..1000u32).step_by(2) {
                set.remove(black_box(id));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_allocate_free_churn,
    bench_reallocate_growth,
    bench_dynamic_array_push,
    bench_map_insert_and_lookup,
    bench_sparse_set_add_remove,
);
criterion_main!(benches);
