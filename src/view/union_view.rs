//! Tagged union view (spec.md §3.6, §4.11): a 1-byte tag followed by
//! alignment padding then a payload slot sized to the largest variant.
//! Reading/writing the payload is only valid while the matching variant's
//! tag is active; switching the active tag first frees whatever dynamic
//! children the old variant owned.

use crate::error::{ViewError, ViewResult};
use crate::schema::{BinaryInfo, SchemaRegistry, UnionVariant};
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::array::ArrayView;
use crate::view::map::MapView;
use crate::view::primitive::{read_primitive, write_primitive, PrimitiveValue};
use crate::view::record::RecordView;
use crate::view::set::SetView;
use crate::view::sparse_set::SparseSetView;
use crate::view::string::StringView;

/// Tag value meaning "no variant selected" — matches [`super::record::RecordView`]'s
/// reading of an all-zero union slot as empty.
pub const NO_VARIANT: u8 = 0;

pub struct UnionView<'a> {
    allocator: &'a mut TlsfAllocator,
    /// Byte offset of the tag; the payload starts at `offset + payload_offset`.
    offset: Pointer,
    payload_offset: u32,
    variants: &'a [UnionVariant],
    registry: &'a SchemaRegistry,
    root_ptr: Pointer,
}

impl<'a> UnionView<'a> {
    pub fn new(
        allocator: &'a mut TlsfAllocator,
        offset: Pointer,
        payload_offset: u32,
        variants: &'a [UnionVariant],
        registry: &'a SchemaRegistry,
        root_ptr: Pointer,
    ) -> Self {
        Self { allocator, offset, payload_offset, variants, registry, root_ptr }
    }

    pub fn tag(&self) -> u8 {
        self.allocator.buffer()[self.offset as usize]
    }

    fn payload_base(&self) -> Pointer {
        self.offset + self.payload_offset
    }

    fn variant(&self, tag: u8) -> Option<&'a UnionVariant> {
        self.variants.iter().find(|v| v.tag == tag)
    }

    fn variant_size(info: &BinaryInfo, registry: &SchemaRegistry) -> u32 {
        match info {
            BinaryInfo::Primitive(k) => k.size(),
            BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } => {
                registry.resolve(schema).map(|s| s.total_size).unwrap_or(0)
            }
            BinaryInfo::Dynamic { .. } => 4,
            _ => 0,
        }
    }

    /// Frees whatever dynamic state the currently active variant owns,
    /// without changing the tag.
    pub fn free_active(&mut self) {
        let tag = self.tag();
        if tag == NO_VARIANT {
            return;
        }
        let Some(variant) = self.variant(tag) else { return };
        let info = variant.binary_info.clone();
        let base = self.payload_base();
        match &info {
            BinaryInfo::Dynamic { kind, element, .. } => {
                use crate::schema::DynamicKind;
                match kind {
                    DynamicKind::String => StringView::new(self.allocator, base, self.root_ptr).free(),
                    DynamicKind::Array => {
                        let stride = element.as_ref().and_then(|e| e.primitive_size()).unwrap_or(4);
                        ArrayView::new(self.allocator, base, self.root_ptr, stride).free();
                    }
                    DynamicKind::Map => MapView::new(self.allocator, base, self.root_ptr, 0, 0).free(),
                    DynamicKind::Set => SetView::new(self.allocator, base, self.root_ptr, 0).free(),
                    DynamicKind::SparseSet => SparseSetView::new(self.allocator, base, self.root_ptr).free(),
                }
            }
            BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } => {
                if let Some(nested_schema) = self.registry.resolve(schema) {
                    let mut nested = RecordView {
                        allocator: &mut *self.allocator,
                        offset: base,
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

    /// Frees the old variant's dynamic state, zeroes the payload region to
    /// the new variant's size, and writes the new tag (spec.md §4.11
    /// "switching variants releases the previous payload").
    pub fn activate(&mut self, tag: u8) -> ViewResult<()> {
        if tag != NO_VARIANT && self.variant(tag).is_none() {
            return Err(ViewError::RangeError { field: "tag", detail: format!("{tag} is not a declared union variant") });
        }
        self.free_active();
        let base = self.payload_base() as usize;
        let size = self
            .variant(tag)
            .map(|v| Self::variant_size(&v.binary_info, self.registry))
            .unwrap_or(0) as usize;
        self.allocator.buffer_mut()[base..base + size].fill(0);
        self.allocator.buffer_mut()[self.offset as usize] = tag;
        Ok(())
    }

    pub fn get_primitive(&self) -> ViewResult<PrimitiveValue> {
        let tag = self.tag();
        let variant = self.variant(tag).ok_or(ViewError::RangeError { field: "tag", detail: "no active variant".into() })?;
        let BinaryInfo::Primitive(kind) = variant.binary_info else {
            return Err(ViewError::TypeError { field: "payload", expected: "primitive variant" });
        };
        Ok(read_primitive(self.allocator.buffer(), self.payload_base(), kind))
    }

    pub fn set_primitive(&mut self, value: PrimitiveValue) -> ViewResult<()> {
        let tag = self.tag();
        let variant = self.variant(tag).ok_or(ViewError::RangeError { field: "tag", detail: "no active variant".into() })?;
        let BinaryInfo::Primitive(kind) = variant.binary_info else {
            return Err(ViewError::TypeError { field: "payload", expected: "primitive variant" });
        };
        let base = self.payload_base();
        write_primitive(self.allocator.buffer_mut(), base, kind, value, "payload")
    }

    pub fn nested(&mut self) -> RecordView<'_> {
        let tag = self.tag();
        let variant = self.variant(tag).unwrap_or_else(|| panic!("no active variant for tag {tag}"));
        let BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } = &variant.binary_info else {
            panic!("active variant is not a nested struct/tuple");
        };
        let nested_schema = self.registry.resolve(schema).unwrap_or_else(|| panic!("schema `{}` not registered", schema.0));
        let base = self.payload_base();
        RecordView { allocator: &mut *self.allocator, offset: base, schema: nested_schema, registry: self.registry, root_ptr: self.root_ptr }
    }

    pub fn string(&mut self) -> StringView<'_> {
        let base = self.payload_base();
        StringView::new(self.allocator, base, self.root_ptr)
    }
}
