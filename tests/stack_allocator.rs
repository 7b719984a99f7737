//! Integration tests for the dynamic array and sparse set containers
//! (spec.md §8 scenarios S3 "push/pop" and S5 "sparse set add/remove").

use nebula_memory::schema::{BinaryInfo, DynamicKind, ElementLayout, FieldSpec, PrimitiveKind, SchemaBuilder, SchemaRegistry};
use nebula_memory::tlsf::TlsfAllocator;
use nebula_memory::view::{ArrayView, RecordView, SparseSetView};

fn new_alloc() -> TlsfAllocator {
    TlsfAllocator::new(vec![0u8; 16384]).unwrap()
}

#[test]
fn scenario_s3_push_pop_preserves_lifo_order_across_growth() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut arr = ArrayView::new(&mut alloc, control, control, 4);
    for i in 0..100u32 {
        arr.push_u32(i);
    }
    assert_eq!(arr.length(), 100);
    for i in (0..100u32).rev() {
        assert_eq!(arr.pop_u32(), Some(i));
    }
    assert!(arr.is_empty());
    assert_eq!(arr.pop_u32(), None);
}

#[test]
fn array_set_bytes_rejects_an_out_of_range_index() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut arr = ArrayView::new(&mut alloc, control, control, 4);
    arr.push_u32(1);
    assert!(!arr.set_bytes(5, &1u32.to_le_bytes()));
    assert!(arr.set_bytes(0, &9u32.to_le_bytes()));
    assert_eq!(arr.get_u32(0), Some(9));
}

#[test]
fn record_view_array_field_grows_and_frees_through_a_schema() {
    let mut alloc = new_alloc();
    let registry = SchemaRegistry::new();
    let array_field = FieldSpec {
        key: "values".to_string(),
        size: 4,
        alignment: 4,
        binary_info: BinaryInfo::Dynamic {
            kind: DynamicKind::Array,
            element: Some(ElementLayout::Primitive(PrimitiveKind::U32)),
            key: None,
        },
        default_value: None,
        bit_width: None,
    };
    let schema = SchemaBuilder::new().push(array_field).finish("Stack");
    let ptr = alloc.allocate(schema.total_size, 0, None).unwrap();
    {
        let mut view = RecordView::new(&mut alloc, ptr, &schema, &registry);
        let mut arr = view.array("values");
        for i in 0..16u32 {
            arr.push_u32(i * i);
        }
        assert_eq!(arr.get_u32(4), Some(16));
    }
    let view = RecordView::new(&mut alloc, ptr, &schema, &registry);
    view.free_root();
}

#[test]
fn scenario_s5_sparse_set_add_remove_and_has() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut set = SparseSetView::new(&mut alloc, control, control);

    for id in [3u32, 1, 4, 1, 5, 9, 2, 6] {
        set.add(id);
    }
    // The duplicate `1` must not have been re-added.
    assert_eq!(set.len(), 7);
    assert!(set.has(9));

    assert!(set.remove(4));
    assert!(!set.has(4));
    assert_eq!(set.len(), 6);

    let mut remaining = set.iterate();
    remaining.sort();
    assert_eq!(remaining, vec![1, 2, 3, 5, 6, 9]);
}

#[test]
fn sparse_set_swap_removal_keeps_every_other_member_findable() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut set = SparseSetView::new(&mut alloc, control, control);
    for id in 0..50u32 {
        set.add(id);
    }
    for id in (0..50u32).step_by(2) {
        set.remove(id);
    }
    for id in 0..50u32 {
        assert_eq!(set.has(id), id % 2 == 1);
    }
}

#[test]
fn sparse_set_clear_then_reuse() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut set = SparseSetView::new(&mut alloc, control, control);
    set.add(1);
    set.add(2);
    set.clear();
    assert!(set.is_empty());
    set.add(7);
    assert!(set.has(7));
    set.free();
}
