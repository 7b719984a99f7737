//! Read-only inspector (spec.md §4.12): reconstructs a tree of
//! `{name, type, offset, size, value, children, total_children_count}` from
//! a root pointer and schema, without mutating anything it walks.
//!
//! Grounded on the teacher's `allocator::stats` snapshot-building pattern
//! (read fields into a plain data struct, no references into the source),
//! generalized from one fixed struct to a schema-interpreted tree.

use crate::schema::{BinaryInfo, DynamicKind, ElementLayout, SchemaLayout, SchemaRegistry};
use crate::tlsf::block::read_u32;
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::primitive::read_primitive;

/// How much of a dynamic container's element/entry list to materialize in
/// one pass. Defaults match spec.md §4.12 (`start_index: 0, count: 100`).
#[derive(Debug, Clone, Copy)]
pub struct PaginationOptions {
    pub start_index: u32,
    pub count: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self { start_index: 0, count: 100 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    pub pagination: PaginationOptions,
}

/// A decoded leaf or branch value. `Inspector` never fails outright — a
/// resolution problem becomes an `Error` leaf inside the tree (spec.md §7
/// "inspector errors are reported in the output tree; they never throw out
/// of the traversal").
#[derive(Debug, Clone)]
pub enum NodeValue {
    Scalar(String),
    /// Dynamic field read without an allocator: only the raw control
    /// pointer is known (spec.md §4.12 "emit only the raw control-pointer
    /// value").
    RawPointer(Pointer),
    Error(String),
    None,
}

#[derive(Debug, Clone)]
pub struct InspectNode {
    pub name: String,
    pub type_name: String,
    pub offset: u32,
    pub size: u32,
    pub value: NodeValue,
    pub children: Vec<InspectNode>,
    /// Logical element/entry count for a dynamic container or fixed array,
    /// independent of how many children were actually materialized under
    /// pagination.
    pub total_children_count: Option<u32>,
}

impl InspectNode {
    fn leaf(name: impl Into<String>, type_name: impl Into<String>, offset: u32, size: u32, value: NodeValue) -> Self {
        Self { name: name.into(), type_name: type_name.into(), offset, size, value, children: Vec::new(), total_children_count: None }
    }
}

/// Walks `schema` starting at `root_ptr` inside `buffer`. `allocator` being
/// `None` degrades dynamic fields to their raw control pointer only.
pub fn inspect(
    buf: &[u8],
    root_ptr: Pointer,
    schema: &SchemaLayout,
    registry: &SchemaRegistry,
    allocator: Option<&TlsfAllocator>,
    options: &InspectOptions,
) -> InspectNode {
    let mut node = InspectNode::leaf(schema.name.clone(), schema.name.clone(), root_ptr, schema.total_size, NodeValue::None);
    for prop in &schema.properties {
        node.children.push(inspect_property(buf, root_ptr, prop, registry, allocator, options));
    }
    node
}

fn inspect_property(
    buf: &[u8],
    base: Pointer,
    prop: &crate::schema::PropertyLayout,
    registry: &SchemaRegistry,
    allocator: Option<&TlsfAllocator>,
    options: &InspectOptions,
) -> InspectNode {
    let offset = base + prop.offset;
    let name = prop.property_key.clone();
    match &prop.binary_info {
        BinaryInfo::Primitive(kind) => {
            let v = read_primitive(buf, offset, *kind);
            InspectNode::leaf(name, format!("{kind:?}"), offset, prop.size, NodeValue::Scalar(format!("{v:?}")))
        }
        BinaryInfo::BitField { bit_offset, bit_width, .. } => {
            let v = crate::view::primitive::read_bitfield(buf, offset, *bit_offset, *bit_width);
            InspectNode::leaf(name, "bitfield", offset, prop.size, NodeValue::Scalar(v.to_string()))
        }
        BinaryInfo::Enum { underlying, members } => {
            let raw = read_primitive(buf, offset, *underlying).as_u64().unwrap_or(0);
            let rendered = enum_display(members, raw);
            InspectNode::leaf(name, "enum", offset, prop.size, NodeValue::Scalar(rendered))
        }
        BinaryInfo::NestedStruct { schema } | BinaryInfo::Tuple { schema } => {
            match registry.resolve(schema) {
                Some(nested_schema) => {
                    let mut node = InspectNode::leaf(name, nested_schema.name.clone(), offset, nested_schema.total_size, NodeValue::None);
                    for child_prop in &nested_schema.properties {
                        node.children.push(inspect_property(buf, offset, child_prop, registry, allocator, options));
                    }
                    node
                }
                None => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(schema = %schema.0, "inspector: unresolved nested schema");
                    InspectNode::leaf(name, "struct", offset, prop.size, NodeValue::Error(format!("unresolved schema `{}`", schema.0)))
                }
            }
        }
        BinaryInfo::FixedArray { element_count, element } => {
            let mut node = InspectNode::leaf(name, "fixed_array", offset, prop.size, NodeValue::None);
            node.total_children_count = Some(*element_count);
            let stride = element_stride(element, registry);
            for i in 0..*element_count {
                let slot_offset = offset + i * stride;
                node.children.push(inspect_element(buf, slot_offset, i, element, registry, allocator, options));
            }
            node
        }
        BinaryInfo::Dynamic { kind, element, key } => inspect_dynamic(buf, offset, &name, *kind, element.as_ref(), key.as_ref(), registry, allocator, options),
        BinaryInfo::Union { variants, payload_offset, .. } => {
            let tag = buf[offset as usize];
            let mut node = InspectNode::leaf(name, "union", offset, prop.size, NodeValue::Scalar(format!("tag={tag}")));
            if tag != 0 {
                if let Some(variant) = variants.iter().find(|v| v.tag == tag) {
                    let payload_off = offset + payload_offset;
                    node.children.push(inspect_union_payload(buf, payload_off, &variant.name, &variant.binary_info, registry, allocator, options));
                }
            }
            node
        }
        BinaryInfo::Optional { inner } => {
            let mut node = InspectNode::leaf(name, "optional", offset, prop.size, NodeValue::None);
            let synthetic = crate::schema::PropertyLayout {
                property_key: String::new(),
                offset: prop.offset,
                size: prop.size,
                alignment: prop.alignment,
                bit_offset: None,
                bit_width: None,
                default_value: None,
                binary_info: (**inner).clone(),
            };
            node.children.push(inspect_property(buf, base, &synthetic, registry, allocator, options));
            node
        }
        BinaryInfo::Ptr => InspectNode::leaf(name, "ptr", offset, prop.size, NodeValue::Scalar(read_u32(buf, offset).to_string())),
    }
}

fn inspect_union_payload(
    buf: &[u8],
    offset: Pointer,
    name: &str,
    info: &BinaryInfo,
    registry: &SchemaRegistry,
    allocator: Option<&TlsfAllocator>,
    options: &InspectOptions,
) -> InspectNode {
    let synthetic = crate::schema::PropertyLayout {
        property_key: name.to_string(),
        offset,
        size: 0,
        alignment: 1,
        bit_offset: None,
        bit_width: None,
        default_value: None,
        binary_info: info.clone(),
    };
    inspect_property(buf, 0, &synthetic, registry, allocator, options)
}

fn element_stride(element: &ElementLayout, registry: &SchemaRegistry) -> u32 {
    match element {
        ElementLayout::Primitive(k) => k.size(),
        ElementLayout::Record(r) => registry.resolve(r).map(|s| s.total_size).unwrap_or(0),
    }
}

fn inspect_element(
    buf: &[u8],
    offset: Pointer,
    index: u32,
    element: &ElementLayout,
    registry: &SchemaRegistry,
    allocator: Option<&TlsfAllocator>,
    options: &InspectOptions,
) -> InspectNode {
    match element {
        ElementLayout::Primitive(kind) => {
            let v = read_primitive(buf, offset, *kind);
            InspectNode::leaf(index.to_string(), format!("{kind:?}"), offset, kind.size(), NodeValue::Scalar(format!("{v:?}")))
        }
        ElementLayout::Record(schema_ref) => match registry.resolve(schema_ref) {
            Some(schema) => {
                let mut node = InspectNode::leaf(index.to_string(), schema.name.clone(), offset, schema.total_size, NodeValue::None);
                for prop in &schema.properties {
                    node.children.push(inspect_property(buf, offset, prop, registry, allocator, options));
                }
                node
            }
            None => {
                #[cfg(feature = "logging")]
                tracing::warn!(schema = %schema_ref.0, "inspector: unresolved element schema");
                InspectNode::leaf(index.to_string(), "record", offset, 0, NodeValue::Error(format!("unresolved schema `{}`", schema_ref.0)))
            }
        },
    }
}

fn inspect_dynamic(
    buf: &[u8],
    offset: Pointer,
    name: &str,
    kind: DynamicKind,
    element: Option<&ElementLayout>,
    key: Option<&ElementLayout>,
    registry: &SchemaRegistry,
    allocator: Option<&TlsfAllocator>,
    options: &InspectOptions,
) -> InspectNode {
    let control_ptr = read_u32(buf, offset);
    let type_name = match kind {
        DynamicKind::String => "string",
        DynamicKind::Array => "array",
        DynamicKind::Map => "map",
        DynamicKind::Set => "set",
        DynamicKind::SparseSet => "sparse_set",
    };
    let Some(allocator) = allocator else {
        return InspectNode::leaf(name, type_name, offset, 4, NodeValue::RawPointer(control_ptr));
    };
    let buf = allocator.buffer();

    match kind {
        DynamicKind::String => {
            if control_ptr == 0 {
                return InspectNode::leaf(name, type_name, offset, 4, NodeValue::Scalar("\"\"".into()));
            }
            let len = read_u32(buf, control_ptr);
            let bytes = &buf[control_ptr as usize + 4..control_ptr as usize + 4 + len as usize];
            let s = String::from_utf8_lossy(bytes).into_owned();
            InspectNode::leaf(name, type_name, offset, 4, NodeValue::Scalar(format!("{s:?}")))
        }
        DynamicKind::Array => {
            let mut node = InspectNode::leaf(name, type_name, offset, 4, NodeValue::None);
            if control_ptr == 0 {
                node.total_children_count = Some(0);
                return node;
            }
            let length = read_u32(buf, control_ptr);
            let capacity = read_u32(buf, control_ptr + 4);
            let elements_ptr = read_u32(buf, control_ptr + 8);
            node.children.push(InspectNode::leaf("length", "u32", control_ptr, 4, NodeValue::Scalar(length.to_string())));
            node.children.push(InspectNode::leaf("capacity", "u32", control_ptr + 4, 4, NodeValue::Scalar(capacity.to_string())));
            node.total_children_count = Some(length);
            let stride = element.map(|e| element_stride(e, registry)).unwrap_or(4);
            let Some(element) = element else { return node };
            let start = options.pagination.start_index.min(length);
            let end = (start + options.pagination.count).min(length);
            for i in start..end {
                node.children.push(inspect_element(buf, elements_ptr + i * stride, i, element, registry, Some(allocator), options));
            }
            node
        }
        DynamicKind::Map | DynamicKind::Set => {
            let mut node = InspectNode::leaf(name, type_name, offset, 4, NodeValue::None);
            if control_ptr == 0 {
                node.total_children_count = Some(0);
                return node;
            }
            let count = read_u32(buf, control_ptr);
            let bucket_capacity = read_u32(buf, control_ptr + 4);
            node.children.push(InspectNode::leaf("count", "u32", control_ptr, 4, NodeValue::Scalar(count.to_string())));
            node.children.push(InspectNode::leaf(
                "bucket_capacity",
                "u32",
                control_ptr + 4,
                4,
                NodeValue::Scalar(bucket_capacity.to_string()),
            ));
            node.total_children_count = Some(count);
            let value_size = element.map(|e| element_stride(e, registry)).unwrap_or(0);
            let entries = collect_entries(buf, control_ptr, bucket_capacity, value_size);
            let start = options.pagination.start_index.min(entries.len() as u32) as usize;
            let end = (start + options.pagination.count as usize).min(entries.len());
            let _ = key;
            for (i, (k, v)) in entries[start..end].iter().enumerate() {
                let key_str = String::from_utf8_lossy(k);
                let label = format!("{key_str}");
                let value_str = if v.is_empty() { String::new() } else { format!("{v:?}") };
                node.children.push(InspectNode::leaf(
                    format!("{}", start + i),
                    "entry",
                    0,
                    0,
                    NodeValue::Scalar(format!("{label} -> {value_str}")),
                ));
            }
            node
        }
        DynamicKind::SparseSet => {
            let mut node = InspectNode::leaf(name, type_name, offset, 4, NodeValue::None);
            if control_ptr == 0 {
                node.total_children_count = Some(0);
                return node;
            }
            let dense_cp = read_u32(buf, control_ptr);
            let count = if dense_cp == 0 { 0 } else { read_u32(buf, dense_cp) };
            node.children.push(InspectNode::leaf("count", "u32", control_ptr, 4, NodeValue::Scalar(count.to_string())));
            node.total_children_count = Some(count);
            if dense_cp != 0 {
                let elements_ptr = read_u32(buf, dense_cp + 8);
                let start = options.pagination.start_index.min(count);
                let end = (start + options.pagination.count).min(count);
                for i in start..end {
                    let v = read_u32(buf, elements_ptr + i * 4);
                    node.children.push(InspectNode::leaf(i.to_string(), "u32", elements_ptr + i * 4, 4, NodeValue::Scalar(v.to_string())));
                }
            }
            node
        }
    }
}

/// Reads every `(key_bytes, value_bytes)` pair out of a hash table's
/// buckets, bypassing [`crate::view::hashtable`] (private to `view`) since
/// the inspector only needs read access, never mutation.
fn collect_entries(buf: &[u8], control_ptr: Pointer, bucket_capacity: u32, value_size: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    if bucket_capacity == 0 {
        return out;
    }
    let buckets_ptr = read_u32(buf, control_ptr + 8);
    for bucket in 0..bucket_capacity {
        let mut entry = read_u32(buf, buckets_ptr + bucket * 4);
        while entry != 0 {
            let next = read_u32(buf, entry);
            let key_len = read_u32(buf, entry + 4);
            let key_start = entry as usize + 8;
            let key = buf[key_start..key_start + key_len as usize].to_vec();
            let value_start = key_start + key_len as usize;
            let value = buf[value_start..value_start + value_size as usize].to_vec();
            out.push((key, value));
            entry = next;
        }
    }
    out
}

fn enum_display(members: &crate::schema::EnumMembers, raw: u64) -> String {
    #[cfg(feature = "debug-info")]
    {
        if let Some(name) = members.name_of(raw) {
            return format!("{name} ({raw})");
        }
    }
    let _ = members;
    raw.to_string()
}

/// Walks every registry root, resolving its owner schema by name (spec.md
/// §4.12 `inspect_all_allocations`, debug-only). `owner_schema_name` maps an
/// `OwnerTypeId` to the schema that should be used to interpret it — the
/// registry itself only stores opaque owner ids (spec.md §3.4), so the
/// caller supplies the mapping the same way codegen would.
#[cfg(feature = "safety")]
pub fn inspect_all_allocations(
    allocator: &TlsfAllocator,
    registry: &SchemaRegistry,
    owner_schema_name: impl Fn(crate::registry::OwnerTypeId) -> Option<&'static str>,
) -> Vec<InspectNode> {
    let mut out = Vec::new();
    for root_ptr in allocator.registry().get_root_pointers() {
        let Some(node) = allocator.registry().get_node(root_ptr) else { continue };
        let Some(schema_name) = owner_schema_name(node.owner_type_id) else { continue };
        let Some(schema) = registry.get(schema_name) else {
            #[cfg(feature = "logging")]
            tracing::warn!(schema_name, "inspector: root allocation's schema not registered");
            out.push(InspectNode::leaf(
                format!("0x{root_ptr:x}"),
                "unknown",
                root_ptr,
                0,
                NodeValue::Error(format!("schema `{schema_name}` not registered")),
            ));
            continue;
        };
        out.push(inspect(allocator.buffer(), root_ptr, schema, registry, Some(allocator), &InspectOptions::default()));
    }
    out
}

#[cfg(not(feature = "safety"))]
pub fn inspect_all_allocations(
    _allocator: &TlsfAllocator,
    _registry: &SchemaRegistry,
    _owner_schema_name: impl Fn(crate::registry::OwnerTypeId) -> Option<&'static str>,
) -> Vec<InspectNode> {
    Vec::new()
}
