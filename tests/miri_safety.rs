//! Safety-build tests (spec.md §6 `safety` feature, §7 error taxonomy):
//! corruption conditions — double free, out-of-region pointers, and
//! use-after-free — must panic rather than silently corrupt the pool, and
//! `is_valid_memory_range` must agree with what is actually live.

#![cfg(feature = "safety")]

use nebula_memory::tlsf::TlsfAllocator;

fn allocator(size: usize) -> TlsfAllocator {
    TlsfAllocator::new(vec![0u8; size]).unwrap()
}

#[test]
#[should_panic]
fn double_free_panics() {
    let mut a = allocator(256);
    let p = a.allocate(32, 0, None).unwrap();
    a.free(p);
    a.free(p);
}

#[test]
#[should_panic]
fn use_after_free_via_get_allocation_size_panics() {
    let mut a = allocator(256);
    let p = a.allocate(32, 0, None).unwrap();
    a.free(p);
    let _ = a.get_allocation_size(p);
}

#[test]
#[should_panic]
fn pointer_outside_region_panics_on_free() {
    let mut a = allocator(256);
    a.free(10_000);
}

#[test]
fn valid_memory_range_accepts_the_whole_live_allocation() {
    let mut a = allocator(256);
    let p = a.allocate(40, 0, None).unwrap();
    let size = a.get_allocation_size(p);
    assert!(a.is_valid_memory_range(p, size));
}

#[test]
fn valid_memory_range_rejects_a_request_past_the_block_end() {
    let mut a = allocator(256);
    let p = a.allocate(16, 0, None).unwrap();
    let size = a.get_allocation_size(p);
    assert!(!a.is_valid_memory_range(p, size + 1));
}

#[test]
fn valid_memory_range_rejects_a_freed_pointer() {
    let mut a = allocator(256);
    let p = a.allocate(16, 0, None).unwrap();
    a.free(p);
    assert!(!a.is_valid_memory_range(p, 1));
}

#[test]
fn registry_tracks_a_fresh_allocation_as_a_root() {
    let mut a = allocator(256);
    let p = a.allocate(16, 0, None).unwrap();
    assert!(a.registry().get_root_pointers().contains(&p));
    assert_eq!(a.registry().get_node(p).unwrap().parent_ptr, None);
}

#[test]
fn registry_links_a_child_under_its_declared_parent() {
    let mut a = allocator(256);
    let parent = a.allocate(16, 0, None).unwrap();
    let child = a.allocate(16, 0, Some(parent)).unwrap();
    assert!(a.registry().get_node(parent).unwrap().children.contains(&child));
    assert_eq!(a.registry().get_node(child).unwrap().parent_ptr, Some(parent));
}

#[test]
fn freeing_a_child_does_not_disturb_its_sibling() {
    let mut a = allocator(512);
    let parent = a.allocate(16, 0, None).unwrap();
    let child_a = a.allocate(16, 0, Some(parent)).unwrap();
    let child_b = a.allocate(16, 0, Some(parent)).unwrap();
    a.free(child_a);
    assert!(a.registry().get_node(parent).unwrap().children.contains(&child_b));
    assert!(!a.registry().get_node(parent).unwrap().children.contains(&child_a));
}
