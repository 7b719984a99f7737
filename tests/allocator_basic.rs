//! Integration tests for `TlsfAllocator`'s public surface: allocate, free,
//! reallocate, and the coalescing/out-of-memory edge cases spec.md §8
//! calls out as scenario S1.

use nebula_memory::tlsf::TlsfAllocator;

fn allocator(size: usize) -> TlsfAllocator {
    TlsfAllocator::new(vec![0u8; size]).expect("region large enough for one block")
}

#[test]
fn fresh_allocation_is_zero_filled() {
    let mut a = allocator(256);
    let p = a.allocate(64, 0, None).unwrap();
    let size = a.get_allocation_size(p);
    assert!(size >= 64);
}

#[test]
fn allocations_never_overlap() {
    let mut a = allocator(512);
    let p1 = a.allocate(48, 0, None).unwrap();
    let p2 = a.allocate(32, 0, None).unwrap();
    let p3 = a.allocate(16, 0, None).unwrap();
    let mut spans = vec![
        (p1, a.get_allocation_size(p1)),
        (p2, a.get_allocation_size(p2)),
        (p3, a.get_allocation_size(p3)),
    ];
    spans.sort_by_key(|&(ptr, _)| ptr);
    for pair in spans.windows(2) {
        let (ptr, size) = pair[0];
        let (next_ptr, _) = pair[1];
        assert!(ptr + size <= next_ptr, "blocks overlap: {pair:?}");
    }
}

#[test]
fn scenario_s1_allocate_free_then_reallocate_fits_the_freed_hole() {
    let mut a = allocator(256);
    let x = a.allocate(32, 0, None).unwrap();
    let y = a.allocate(32, 0, None).unwrap();
    a.free(x);
    a.free(y);
    // After freeing both neighbors they should coalesce into one block large
    // enough to satisfy a request bigger than either original allocation.
    let z = a.allocate(60, 0, None);
    assert!(z.is_ok());
}

#[test]
fn free_of_null_pointer_is_a_no_op() {
    let mut a = allocator(128);
    a.free(0);
}

#[test]
fn reallocate_shrink_keeps_the_same_pointer() {
    let mut a = allocator(256);
    let p = a.allocate(100, 0, None).unwrap();
    let shrunk = a.reallocate(p, 8, 0, None).unwrap();
    assert_eq!(shrunk, p);
    assert!(a.get_allocation_size(shrunk) < 100);
}

#[test]
fn reallocate_grow_preserves_prefix_bytes() {
    let mut a = allocator(512);
    let p = a.allocate(16, 0, None).unwrap();
    a.buffer_mut()[p as usize..p as usize + 4].copy_from_slice(&42u32.to_le_bytes());
    let grown = a.reallocate(p, 256, 0, None).unwrap();
    let preserved = u32::from_le_bytes(a.buffer()[grown as usize..grown as usize + 4].try_into().unwrap());
    assert_eq!(preserved, 42);
}

#[test]
fn reallocate_to_zero_frees_and_returns_null() {
    let mut a = allocator(256);
    let p = a.allocate(32, 0, None).unwrap();
    assert_eq!(a.reallocate(p, 0, 0, None).unwrap(), 0);
}

#[test]
fn reallocate_from_null_behaves_as_allocate() {
    let mut a = allocator(256);
    let p = a.reallocate(0, 16, 0, None).unwrap();
    assert_ne!(p, 0);
    assert!(a.get_allocation_size(p) >= 16);
}

#[test]
fn out_of_memory_is_a_recoverable_error_not_a_panic() {
    let mut a = allocator(64);
    let result = a.allocate(1_000_000, 0, None);
    assert!(result.is_err());
    // The allocator must remain usable after a failed request.
    assert!(a.allocate(8, 0, None).is_ok());
}

#[cfg(feature = "stats")]
#[test]
fn stats_track_live_bytes_across_allocate_and_free() {
    let mut a = allocator(256);
    let before = a.stats().live_bytes;
    let p = a.allocate(32, 0, None).unwrap();
    assert!(a.stats().live_bytes > before);
    a.free(p);
    assert_eq!(a.stats().live_bytes, before);
}

#[test]
#[should_panic]
fn double_free_is_fatal() {
    let mut a = allocator(128);
    let p = a.allocate(16, 0, None).unwrap();
    a.free(p);
    a.free(p);
}

#[test]
#[should_panic]
fn freeing_an_out_of_region_pointer_is_fatal() {
    let mut a = allocator(128);
    a.free(1_000_000);
}
