//! Integration tests for the hashmap/set dynamic containers (spec.md §4.9,
//! §8 scenario S4: "set/get/resize"), driven both standalone and through a
//! schema'd `RecordView`.

use nebula_memory::schema::{BinaryInfo, DynamicKind, ElementLayout, FieldSpec, PrimitiveKind, SchemaBuilder, SchemaRegistry};
use nebula_memory::tlsf::TlsfAllocator;
use nebula_memory::view::{MapView, RecordView, SetView};

fn new_alloc() -> TlsfAllocator {
    TlsfAllocator::new(vec![0u8; 32768]).unwrap()
}

#[test]
fn scenario_s4_string_keyed_counters_survive_a_resize() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut map = MapView::new(&mut alloc, control, control, 0, 4);

    // 32 entries forces at least one resize past the 0.75 load factor on an
    // 8-slot starting bucket array.
    for i in 0..32u32 {
        map.set_u32(format!("counter-{i}").as_bytes(), i);
    }
    assert_eq!(map.len(), 32);
    for i in 0..32u32 {
        assert_eq!(map.get_u32(format!("counter-{i}").as_bytes()), Some(i));
    }
}

#[test]
fn overwriting_an_existing_key_does_not_grow_the_count() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut map = MapView::new(&mut alloc, control, control, 0, 4);
    map.set_u32(b"x", 1);
    map.set_u32(b"x", 2);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get_u32(b"x"), Some(2));
}

#[test]
fn map_delete_then_free_leaves_nothing_live() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut map = MapView::new(&mut alloc, control, control, 0, 4);
    for i in 0..10u32 {
        map.set_u32(format!("k{i}").as_bytes(), i);
    }
    for i in 0..10u32 {
        assert!(map.delete(format!("k{i}").as_bytes()));
    }
    assert_eq!(map.len(), 0);
    map.free();
}

#[test]
fn set_view_rejects_duplicate_inserts() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut set = SetView::new(&mut alloc, control, control, 0);
    assert!(set.insert(b"alpha"));
    assert!(!set.insert(b"alpha"));
    assert_eq!(set.len(), 1);
    assert!(set.has(b"alpha"));
    assert!(set.remove(b"alpha"));
    assert!(!set.has(b"alpha"));
}

#[test]
fn set_iterate_sees_every_member_exactly_once() {
    let mut alloc = new_alloc();
    let control = alloc.allocate(4, 0, None).unwrap();
    let mut set = SetView::new(&mut alloc, control, control, 0);
    for tag in ["red", "green", "blue"] {
        set.insert(tag.as_bytes());
    }
    let mut members: Vec<String> = set.iterate().into_iter().map(|b| String::from_utf8(b).unwrap()).collect();
    members.sort();
    assert_eq!(members, vec!["blue", "green", "red"]);
}

#[test]
fn record_view_map_field_round_trips_through_a_schema() {
    let mut alloc = new_alloc();
    let registry = SchemaRegistry::new();
    let map_field = FieldSpec {
        key: "scores".to_string(),
        size: 4,
        alignment: 4,
        binary_info: BinaryInfo::Dynamic {
            kind: DynamicKind::Map,
            element: Some(ElementLayout::Primitive(PrimitiveKind::U32)),
            key: Some(ElementLayout::Primitive(PrimitiveKind::U32)),
        },
        default_value: None,
        bit_width: None,
    };
    let schema = SchemaBuilder::new().push(map_field).finish("Scoreboard");

    let ptr = alloc.allocate(schema.total_size, 0, None).unwrap();
    {
        let mut view = RecordView::new(&mut alloc, ptr, &schema, &registry);
        let mut map = view.map("scores");
        map.set_u32(&7u32.to_le_bytes(), 100);
        map.set_u32(&9u32.to_le_bytes(), 200);
        assert_eq!(map.get_u32(&7u32.to_le_bytes()), Some(100));
        assert_eq!(map.len(), 2);
    }
    let view = RecordView::new(&mut alloc, ptr, &schema, &registry);
    view.free_root();
}
