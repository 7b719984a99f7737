//! Record view: the field-accessor surface over a schema (spec.md §4.6).
//!
//! A `RecordView` is a thin handle `(allocator, offset, schema, registry)` —
//! constructing one never allocates. `offset` is the record's own base
//! address; for a root record that is a TLSF user pointer, for a nested
//! struct/tuple it is `parent.offset + field.offset` inside the same buffer.
//! `root_ptr` is always the nearest *owning* TLSF allocation, threaded
//! through nested views unchanged — dynamic fields anywhere in the tree
//! register their control blocks as children of `root_ptr` (spec.md §3.6
//! "ownership rule"), since a nested struct never owns an allocation of its
//! own.

use crate::error::{ViewError, ViewResult};
use crate::schema::{BinaryInfo, ElementLayout, PropertyLayout, SchemaLayout, SchemaRegistry};
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::array::ArrayView;
use crate::view::map::MapView;
use crate::view::primitive::{read_bitfield, read_primitive, write_bitfield, write_primitive, PrimitiveValue};
use crate::view::set::SetView;
use crate::view::sparse_set::SparseSetView;
use crate::view::string::StringView;
use crate::view::union_view::UnionView;

pub struct RecordView<'a> {
    pub(crate) allocator: &'a mut TlsfAllocator,
    pub(crate) offset: Pointer,
    pub(crate) schema: &'a SchemaLayout,
    pub(crate) registry: &'a SchemaRegistry,
    pub(crate) root_ptr: Pointer,
}

impl<'a> RecordView<'a> {
    /// A root view: `offset` must be a live user pointer previously returned
    /// by `allocator.allocate(schema.total_size, ..)`.
    pub fn new(
        allocator: &'a mut TlsfAllocator,
        offset: Pointer,
        schema: &'a SchemaLayout,
        registry: &'a SchemaRegistry,
    ) -> Self {
        Self { allocator, offset, schema, registry, root_ptr: offset }
    }

    fn property(&self, key: &'static str) -> &'a PropertyLayout {
        self.schema.property(key).unwrap_or_else(|| panic!("unknown field `{key}` on `{}`", self.schema.name))
    }

    fn field_offset(&self, prop: &PropertyLayout) -> Pointer {
        self.offset + prop.offset
    }

    // ---- primitives, bit-fields, enums (spec.md §4.6) --------------------

    pub fn get(&self, key: &'static str) -> PrimitiveValue {
        let prop = self.property(key);
        let offset = self.field_offset(prop);
        match &prop.binary_info {
            BinaryInfo::Primitive(kind) => read_primitive(self.allocator.buffer(), offset, *kind),
            BinaryInfo::BitField { bit_offset, bit_width, .. } => {
                PrimitiveValue::U32(read_bitfield(self.allocator.buffer(), offset, *bit_offset, *bit_width))
            }
            BinaryInfo::Enum { underlying, .. } => read_primitive(self.allocator.buffer(), offset, *underlying),
            other => panic!("`{key}` is not a scalar field ({other:?})"),
        }
    }

    pub fn set(&mut self, key: &'static str, value: PrimitiveValue) -> ViewResult<()> {
        let prop = self.property(key);
        let offset = self.field_offset(prop);
        match &prop.binary_info {
            BinaryInfo::Primitive(kind) => {
                write_primitive(self.allocator.buffer_mut(), offset, *kind, value, key)
            }
            BinaryInfo::BitField { bit_offset, bit_width, .. } => {
                let Some(raw) = value.as_u64() else {
                    return Err(ViewError::TypeError { field: key, expected: "integer" });
                };
                write_bitfield(self.allocator.buffer_mut(), offset, *bit_offset, *bit_width, raw as u32, key)
            }
            BinaryInfo::Enum { underlying, members } => {
                let Some(raw) = value.as_u64() else {
                    return Err(ViewError::TypeError { field: key, expected: "integer" });
                };
                if !members.is_member(raw) {
                    return Err(ViewError::RangeError {
                        field: key,
                        detail: format!("{raw} is not a declared enum member"),
                    });
                }
                write_primitive(self.allocator.buffer_mut(), offset, *underlying, value, key)
            }
            other => panic!("`{key}` is not a scalar field ({other:?})"),
        }
    }

    // ---- nested struct / tuple ---------------------------------------------

    pub fn nested(&mut self, key: &'static str) -> RecordView<'_> {
        let prop = self.property(key);
        let offset = self.field_offset(prop);
        let schema_ref = match &prop.binary_info {
            BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } => schema,
            other => panic!("`{key}` is not a nested struct/tuple field ({other:?})"),
        };
        let nested_schema = self
            .registry
            .resolve(schema_ref)
            .unwrap_or_else(|| panic!("schema `{}` not registered", schema_ref.0));
        RecordView {
            allocator: &mut *self.allocator,
            offset,
            schema: nested_schema,
            registry: self.registry,
            root_ptr: self.root_ptr,
        }
    }

    // ---- fixed arrays ---------------------------------------------------

    fn fixed_array_layout(&self, key: &'static str) -> (Pointer, u32, &'a ElementLayout) {
        let prop = self.property(key);
        let base = self.field_offset(prop);
        match &prop.binary_info {
            BinaryInfo::FixedArray { element_count, element } => (base, *element_count, element),
            other => panic!("`{key}` is not a fixed array ({other:?})"),
        }
    }

    fn element_stride(&self, element: &ElementLayout) -> u32 {
        match element {
            ElementLayout::Primitive(k) => k.size(),
            ElementLayout::Record(schema_ref) => {
                self.registry.resolve(schema_ref).unwrap_or_else(|| panic!("schema `{}` not registered", schema_ref.0)).total_size
            }
        }
    }

    /// Reads a primitive-typed fixed array slot. Panics (a programmer error,
    /// not a data error) if `index` is out of bounds or the element isn't a
    /// primitive — use [`Self::fixed_array_element`] for record/dynamic
    /// elements.
    pub fn get_fixed_array(&self, key: &'static str, index: u32) -> PrimitiveValue {
        let (base, count, element) = self.fixed_array_layout(key);
        assert!(index < count, "fixed array index {index} out of bounds ({count})");
        let ElementLayout::Primitive(kind) = element else {
            panic!("`{key}[{index}]` is not a primitive element");
        };
        read_primitive(self.allocator.buffer(), base + index * kind.size(), *kind)
    }

    pub fn set_fixed_array(&mut self, key: &'static str, index: u32, value: PrimitiveValue) -> ViewResult<()> {
        let (base, count, element) = self.fixed_array_layout(key);
        assert!(index < count, "fixed array index {index} out of bounds ({count})");
        let ElementLayout::Primitive(kind) = element else {
            panic!("`{key}[{index}]` is not a primitive element");
        };
        write_primitive(self.allocator.buffer_mut(), base + index * kind.size(), *kind, value, key)
    }

    /// A record-typed fixed array slot (nested struct, or a single-field
    /// wrapper record around a dynamic container), per spec.md §4.6.
    pub fn fixed_array_element(&mut self, key: &'static str, index: u32) -> RecordView<'_> {
        let (base, count, element) = self.fixed_array_layout(key);
        assert!(index < count, "fixed array index {index} out of bounds ({count})");
        let ElementLayout::Record(schema_ref) = element else {
            panic!("`{key}[{index}]` is not a record element");
        };
        let element_schema = self
            .registry
            .resolve(schema_ref)
            .unwrap_or_else(|| panic!("schema `{}` not registered", schema_ref.0));
        let stride = element_schema.total_size;
        RecordView {
            allocator: &mut *self.allocator,
            offset: base + index * stride,
            schema: element_schema,
            registry: self.registry,
            root_ptr: self.root_ptr,
        }
    }

    // ---- dynamic containers (spec.md §3.6, §4.7–§4.10) --------------------

    fn dynamic_control_slot(&self, key: &'static str) -> Pointer {
        let prop = self.property(key);
        if !prop.is_dynamic() {
            panic!("`{key}` is not a dynamic field");
        }
        self.field_offset(prop)
    }

    pub fn string(&mut self, key: &'static str) -> StringView<'_> {
        let slot = self.dynamic_control_slot(key);
        StringView::new(self.allocator, slot, self.root_ptr)
    }

    pub fn array(&mut self, key: &'static str) -> ArrayView<'_> {
        let prop = self.property(key);
        let slot = self.field_offset(prop);
        let BinaryInfo::Dynamic { kind: crate::schema::DynamicKind::Array, element, .. } = &prop.binary_info
        else {
            panic!("`{key}` is not a dynamic array");
        };
        let element = element.as_ref().unwrap_or_else(|| panic!("`{key}` has no element layout"));
        let stride = self.element_stride(element);
        ArrayView::new(self.allocator, slot, self.root_ptr, stride)
    }

    pub fn map(&mut self, key: &'static str) -> MapView<'_> {
        let prop = self.property(key);
        let slot = self.field_offset(prop);
        let BinaryInfo::Dynamic { kind: crate::schema::DynamicKind::Map, element, key: key_layout } =
            &prop.binary_info
        else {
            panic!("`{key}` is not a dynamic map");
        };
        let value = element.as_ref().unwrap_or_else(|| panic!("`{key}` has no value layout"));
        let key_layout = key_layout.as_ref().unwrap_or_else(|| panic!("`{key}` has no key layout"));
        let key_size = self.element_stride(key_layout);
        let value_size = self.element_stride(value);
        MapView::new(self.allocator, slot, self.root_ptr, key_size, value_size)
    }

    pub fn set_container(&mut self, key: &'static str) -> SetView<'_> {
        let prop = self.property(key);
        let slot = self.field_offset(prop);
        let BinaryInfo::Dynamic { kind: crate::schema::DynamicKind::Set, key: key_layout, .. } =
            &prop.binary_info
        else {
            panic!("`{key}` is not a dynamic set");
        };
        let key_layout = key_layout.as_ref().unwrap_or_else(|| panic!("`{key}` has no key layout"));
        let key_size = self.element_stride(key_layout);
        SetView::new(self.allocator, slot, self.root_ptr, key_size)
    }

    pub fn sparse_set(&mut self, key: &'static str) -> SparseSetView<'_> {
        let slot = self.dynamic_control_slot(key);
        SparseSetView::new(self.allocator, slot, self.root_ptr)
    }

    pub fn union(&mut self, key: &'static str) -> UnionView<'_> {
        let prop = self.property(key);
        let offset = self.field_offset(prop);
        let BinaryInfo::Union { variants, payload_offset, .. } = &prop.binary_info else {
            panic!("`{key}` is not a union field");
        };
        UnionView::new(self.allocator, offset, *payload_offset, variants, self.registry, self.root_ptr)
    }

    // ---- deep free (spec.md §3.7, §4.8's "free releases all dynamic
    // children") --------------------------------------------------------

    /// Frees every dynamic allocation this record directly or transitively
    /// owns, without freeing the record's own slot (nested structs don't own
    /// one; see [`Self::free_root`] for the root case).
    pub fn free_dynamic_children(&mut self) {
        for i in 0..self.schema.properties.len() {
            let prop = self.schema.properties[i].clone();
            self.free_property(&prop);
        }
    }

    fn free_property(&mut self, prop: &PropertyLayout) {
        let offset = self.offset + prop.offset;
        match &prop.binary_info {
            BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } => {
                let Some(nested_schema) = self.registry.resolve(schema) else { return };
                let mut nested = RecordView {
                    allocator: &mut *self.allocator,
                    offset,
                    schema: nested_schema,
                    registry: self.registry,
                    root_ptr: self.root_ptr,
                };
                nested.free_dynamic_children();
            }
            BinaryInfo::FixedArray { element_count, element } => {
                if let ElementLayout::Record(schema_ref) = element {
                    if let Some(element_schema) = self.registry.resolve(schema_ref) {
                        let stride = element_schema.total_size;
                        for idx in 0..*element_count {
                            let mut elem = RecordView {
                                allocator: &mut *self.allocator,
                                offset: offset + idx * stride,
                                schema: element_schema,
                                registry: self.registry,
                                root_ptr: self.root_ptr,
                            };
                            elem.free_dynamic_children();
                        }
                    }
                }
            }
            BinaryInfo::Dynamic { kind, element, .. } => {
                self.free_dynamic_container(*kind, offset, element.clone());
            }
            BinaryInfo::Union { variants, payload_offset, .. } => {
                let tag = self.allocator.buffer()[offset as usize];
                if tag == 0 {
                    return;
                }
                if let Some(variant) = variants.iter().find(|v| v.tag == tag) {
                    self.free_union_variant(offset + payload_offset, &variant.binary_info.clone());
                }
            }
            _ => {}
        }
    }

    fn free_union_variant(&mut self, payload_offset: Pointer, info: &BinaryInfo) {
        match info {
            BinaryInfo::Dynamic { kind, element, .. } => {
                self.free_dynamic_container(*kind, payload_offset, element.clone());
            }
            BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } => {
                if let Some(nested_schema) = self.registry.resolve(schema) {
                    let mut nested = RecordView {
                        allocator: &mut *self.allocator,
                        offset: payload_offset,
                        schema: nested_schema,
                        registry: self.registry,
                        root_ptr: self.root_ptr,
                    };
                    nested.free_dynamic_children();
                }
            }
            _ => {}
        }
    }

    fn free_dynamic_container(
        &mut self,
        kind: crate::schema::DynamicKind,
        slot: Pointer,
        element: Option<ElementLayout>,
    ) {
        use crate::schema::DynamicKind;
        match kind {
            DynamicKind::String => StringView::new(self.allocator, slot, self.root_ptr).free(),
            DynamicKind::Array => {
                let stride = element.as_ref().map(|e| self.element_stride(e)).unwrap_or(4);
                let element_schema = match &element {
                    Some(ElementLayout::Record(r)) => self.registry.resolve(r).cloned(),
                    _ => None,
                };
                let mut view = ArrayView::new(self.allocator, slot, self.root_ptr, stride);
                if let Some(schema) = &element_schema {
                    view.free_with_schema(schema, self.registry);
                } else {
                    view.free();
                }
            }
            DynamicKind::Map => {
                let value = element.as_ref();
                let value_size = value.map(|e| self.element_stride(e)).unwrap_or(0);
                MapView::new(self.allocator, slot, self.root_ptr, 0, value_size).free();
            }
            DynamicKind::Set => SetView::new(self.allocator, slot, self.root_ptr, 0).free(),
            DynamicKind::SparseSet => SparseSetView::new(self.allocator, slot, self.root_ptr).free(),
        }
    }

    /// Frees the record's own TLSF allocation after first freeing every
    /// dynamic child — only valid for a root view whose `offset` is itself a
    /// live user pointer (spec.md §3.7).
    pub fn free_root(mut self) {
        self.free_dynamic_children();
        self.allocator.free(self.root_ptr);
    }
}
