//! Schema model (spec.md §3.5): describes one record type's layout so the
//! view runtime can read/write its fields without code generation.
//!
//! Grounded on the nested, per-feature config-struct convention in
//! `core/config.rs`/`config.rs` (optional sub-structs selected by a kind
//! discriminant) adapted to `PropertyLayout`'s binary-kind selectors.

use hashbrown::HashMap;

/// Underlying primitive representation of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
}

impl PrimitiveKind {
    /// Byte width of the stored representation.
    pub const fn size(self) -> u32 {
        match self {
            Self::U8 | Self::I8 | Self::Bool => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

/// One dynamic-container flavor a field can be (spec.md §3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicKind {
    String,
    Array,
    Map,
    Set,
    SparseSet,
}

/// An enum field's declared members, kept (under `debug-info`) for the
/// inspector's `"<name> (<n>)"` rendering and for write validation.
#[derive(Debug, Clone, Default)]
pub struct EnumMembers {
    #[cfg(feature = "debug-info")]
    names_by_value: HashMap<u64, String>,
    valid_values: hashbrown::HashSet<u64>,
}

impl EnumMembers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: u64, name: &str) {
        self.valid_values.insert(value);
        #[cfg(feature = "debug-info")]
        self.names_by_value.insert(value, name.to_string());
        #[cfg(not(feature = "debug-info"))]
        let _ = name;
    }

    pub fn is_member(&self, value: u64) -> bool {
        self.valid_values.contains(&value)
    }

    #[cfg(feature = "debug-info")]
    pub fn name_of(&self, value: u64) -> Option<&str> {
        self.names_by_value.get(&value).map(String::as_str)
    }
}

/// What a single array/map slot (element or key) is made of. Covers both
/// halves of spec.md §4.6's "for primitive or POD element types the array is
/// a raw strided region; for nested dynamic elements, each slot is itself a
/// record/control-block".
#[derive(Debug, Clone)]
pub enum ElementLayout {
    Primitive(PrimitiveKind),
    /// The slot is itself a record — a nested struct, or a single-field
    /// wrapper record around a dynamic container (string/array/map/...).
    Record(SchemaRef),
}

impl ElementLayout {
    /// Byte stride of one slot; for `Record`, the caller must resolve the
    /// schema through a [`SchemaRegistry`] and use its `total_size` instead
    /// (this fast path only covers the primitive case).
    pub fn primitive_size(&self) -> Option<u32> {
        match self {
            Self::Primitive(k) => Some(k.size()),
            Self::Record(_) => None,
        }
    }
}

/// The discriminated "what kind of field is this" selector (spec.md §3.5
/// `binary_info`). Exactly one variant applies to a given [`PropertyLayout`].
#[derive(Debug, Clone)]
pub enum BinaryInfo {
    Primitive(PrimitiveKind),
    /// Packed into a shared 32-bit container at the field's offset.
    BitField { underlying: PrimitiveKind, bit_offset: u8, bit_width: u8 },
    Enum { underlying: PrimitiveKind, members: EnumMembers },
    NestedStruct { schema: SchemaRef },
    /// Positional fields; otherwise identical to a nested struct.
    Tuple { schema: SchemaRef },
    /// Present iff the field is a fixed-size array; absent for scalars.
    FixedArray { element_count: u32, element: ElementLayout },
    /// A dynamic container control pointer (spec.md §3.6). `element` is the
    /// array/set value type or the map value type; `key` is the map/set key
    /// type. Both are `None` for `String` and `SparseSet` (whose element
    /// type, `u32`, is implicit).
    Dynamic { kind: DynamicKind, element: Option<ElementLayout>, key: Option<ElementLayout> },
    /// `payload_offset` is the byte offset (relative to the union field's own
    /// offset) of the payload slot, i.e. `1` rounded up to `payload_align`
    /// (spec.md §3.6: "1-byte tag followed by alignment padding then the
    /// payload slot sized to the largest variant").
    Union { variants: Vec<UnionVariant>, payload_offset: u32, payload_align: u32 },
    Optional { inner: Box<BinaryInfo> },
    Ptr,
}

/// A reference to another record's [`SchemaLayout`]. Schemas are registered
/// by name in a [`SchemaRegistry`] and looked up lazily so recursive/mutual
/// record references don't require building the graph up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaRef(pub String);

#[derive(Debug, Clone)]
pub struct UnionVariant {
    pub tag: u8,
    pub name: String,
    pub binary_info: BinaryInfo,
}

/// One field of a [`SchemaLayout`].
#[derive(Debug, Clone)]
pub struct PropertyLayout {
    pub property_key: String,
    pub offset: u32,
    pub size: u32,
    pub alignment: u32,
    pub bit_offset: Option<u8>,
    pub bit_width: Option<u8>,
    pub default_value: Option<u64>,
    pub binary_info: BinaryInfo,
}

impl PropertyLayout {
    pub fn is_bit_field(&self) -> bool {
        self.bit_offset.is_some() && self.bit_width.is_some()
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.binary_info, BinaryInfo::Dynamic { .. })
    }
}

/// Describes one record type: total size, alignment, and its ordered
/// fields. Built by [`SchemaBuilder`], which packs bit-fields and computes
/// offsets the way a field-by-field layout pass would.
#[derive(Debug, Clone)]
pub struct SchemaLayout {
    pub name: String,
    pub total_size: u32,
    pub alignment: u32,
    pub has_dynamic_data: bool,
    pub properties: Vec<PropertyLayout>,
}

impl SchemaLayout {
    pub fn property(&self, key: &str) -> Option<&PropertyLayout> {
        self.properties.iter().find(|p| p.property_key == key)
    }

    pub fn property_index(&self, key: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.property_key == key)
    }
}

/// A single field request fed to [`SchemaBuilder::push`].
pub struct FieldSpec {
    pub key: String,
    pub size: u32,
    pub alignment: u32,
    pub binary_info: BinaryInfo,
    pub default_value: Option<u64>,
    /// Bit width for a bit-packable field; `None` for ordinary fields.
    pub bit_width: Option<u8>,
}

/// Lays out a record's fields in declaration order, packing adjacent
/// bit-fields into a shared 32-bit container (spec.md §3.5, §9).
#[derive(Default)]
pub struct SchemaBuilder {
    properties: Vec<PropertyLayout>,
    cursor: u32,
    max_alignment: u32,
    has_dynamic_data: bool,
    open_bitfield_container: Option<(u32, u8)>, // (offset, bits used)
}

const BITFIELD_CONTAINER_BITS: u8 = 32;
const BITFIELD_CONTAINER_BYTES: u32 = 4;

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_bitfield_container(&mut self) {
        if self.open_bitfield_container.take().is_some() {
            self.cursor = align_up(self.cursor, BITFIELD_CONTAINER_BYTES);
        }
    }

    /// Appends a field, packing it into the current bit-field container
    /// when possible; otherwise closes any open container and aligns a
    /// fresh field the ordinary way.
    pub fn push(&mut self, field: FieldSpec) -> &mut Self {
        if let Some(bit_width) = field.bit_width {
            let fits_open = self
                .open_bitfield_container
                .map(|(_, used)| used + bit_width <= BITFIELD_CONTAINER_BITS)
                .unwrap_or(false);
            let container_offset = if fits_open {
                self.open_bitfield_container.unwrap().0
            } else {
                self.close_bitfield_container();
                let offset = align_up(self.cursor, BITFIELD_CONTAINER_BYTES);
                self.cursor = offset + BITFIELD_CONTAINER_BYTES;
                self.max_alignment = self.max_alignment.max(BITFIELD_CONTAINER_BYTES);
                offset
            };
            let bit_offset = self.open_bitfield_container.map(|(_, used)| used).unwrap_or(0);
            self.open_bitfield_container = Some((container_offset, bit_offset + bit_width));

            self.properties.push(PropertyLayout {
                property_key: field.key,
                offset: container_offset,
                size: BITFIELD_CONTAINER_BYTES,
                alignment: BITFIELD_CONTAINER_BYTES,
                bit_offset: Some(bit_offset),
                bit_width: Some(bit_width),
                default_value: field.default_value,
                binary_info: field.binary_info,
            });
            return self;
        }

        self.close_bitfield_container();
        let offset = align_up(self.cursor, field.alignment);
        self.cursor = offset + field.size;
        self.max_alignment = self.max_alignment.max(field.alignment);
        if matches!(field.binary_info, BinaryInfo::Dynamic { .. }) {
            self.has_dynamic_data = true;
        }
        self.properties.push(PropertyLayout {
            property_key: field.key,
            offset,
            size: field.size,
            alignment: field.alignment,
            bit_offset: None,
            bit_width: None,
            default_value: field.default_value,
            binary_info: field.binary_info,
        });
        self
    }

    pub fn finish(mut self, name: impl Into<String>) -> SchemaLayout {
        self.close_bitfield_container();
        let alignment = self.max_alignment.max(1);
        let total_size = align_up(self.cursor, alignment);
        SchemaLayout {
            name: name.into(),
            total_size,
            alignment,
            has_dynamic_data: self.has_dynamic_data,
            properties: self.properties,
        }
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        return value;
    }
    (value + align - 1) & !(align - 1)
}

/// Offset of a union's payload slot given its largest variant's alignment
/// (spec.md §3.6): the 1-byte tag, rounded up to `payload_align`.
pub fn union_payload_offset(payload_align: u32) -> u32 {
    align_up(1, payload_align.max(1))
}

/// Total size of a union field: payload offset plus payload size, rounded up
/// to the payload's own alignment.
pub fn union_total_size(payload_align: u32, payload_size: u32) -> u32 {
    align_up(union_payload_offset(payload_align) + payload_size, payload_align.max(1))
}

/// Registry of named schemas, so nested/union/element types can be resolved
/// by name without requiring the whole type graph up front.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, SchemaLayout>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema: SchemaLayout) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaLayout> {
        self.schemas.get(name)
    }

    pub fn resolve(&self, schema_ref: &SchemaRef) -> Option<&SchemaLayout> {
        self.get(&schema_ref.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_field(key: &str) -> FieldSpec {
        FieldSpec {
            key: key.to_string(),
            size: 4,
            alignment: 4,
            binary_info: BinaryInfo::Primitive(PrimitiveKind::U32),
            default_value: None,
            bit_width: None,
        }
    }

    #[test]
    fn simple_record_lays_out_fields_in_order() {
        let schema = SchemaBuilder::new()
            .push(u32_field("id"))
            .push(FieldSpec {
                key: "flag".to_string(),
                size: 1,
                alignment: 1,
                binary_info: BinaryInfo::Primitive(PrimitiveKind::U8),
                default_value: None,
                bit_width: None,
            })
            .finish("Simple");
        assert_eq!(schema.property("id").unwrap().offset, 0);
        assert_eq!(schema.property("flag").unwrap().offset, 4);
        assert_eq!(schema.total_size, 8); // aligned up to the u32 field's alignment
    }

    #[test]
    fn adjacent_bit_fields_share_one_container() {
        let mk = |key: &str, w: u8| FieldSpec {
            key: key.to_string(),
            size: 4,
            alignment: 4,
            binary_info: BinaryInfo::BitField { underlying: PrimitiveKind::U32, bit_offset: 0, bit_width: w },
            default_value: None,
            bit_width: Some(w),
        };
        let schema = SchemaBuilder::new().push(mk("a", 1)).push(mk("b", 6)).finish("Bits");
        let a = schema.property("a").unwrap();
        let b = schema.property("b").unwrap();
        assert_eq!(a.offset, b.offset);
        assert_eq!(a.bit_offset, Some(0));
        assert_eq!(b.bit_offset, Some(1));
    }

    #[test]
    fn overflowing_container_starts_a_new_one() {
        let mk = |key: &str, w: u8| FieldSpec {
            key: key.to_string(),
            size: 4,
            alignment: 4,
            binary_info: BinaryInfo::BitField { underlying: PrimitiveKind::U32, bit_offset: 0, bit_width: w },
            default_value: None,
            bit_width: Some(w),
        };
        let schema = SchemaBuilder::new().push(mk("a", 30)).push(mk("b", 10)).finish("Bits2");
        let a = schema.property("a").unwrap();
        let b = schema.property("b").unwrap();
        assert_ne!(a.offset, b.offset);
        assert_eq!(b.offset, a.offset + 4);
    }
}
