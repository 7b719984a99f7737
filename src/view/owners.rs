//! Reserved [`OwnerTypeId`](crate::registry::OwnerTypeId) values the view
//! layer uses when registering a dynamic container's own control-block
//! allocations. These are opaque markers for the debug registry's
//! visualization (spec.md §3.4) — they carry no meaning to the allocator or
//! to `free`/`reallocate`, unlike a real schema's owner id.

use crate::registry::OwnerTypeId;

pub const STRING_BUFFER: OwnerTypeId = u32::MAX;
pub const ARRAY_CONTROL: OwnerTypeId = u32::MAX - 1;
pub const ARRAY_ELEMENTS: OwnerTypeId = u32::MAX - 2;
pub const MAP_CONTROL: OwnerTypeId = u32::MAX - 3;
pub const MAP_BUCKETS: OwnerTypeId = u32::MAX - 4;
pub const MAP_ENTRY: OwnerTypeId = u32::MAX - 5;
pub const SPARSE_SET_CONTROL: OwnerTypeId = u32::MAX - 6;
pub const SPARSE_SET_DENSE: OwnerTypeId = u32::MAX - 7;
pub const SPARSE_SET_SPARSE: OwnerTypeId = u32::MAX - 8;
pub const UNION_PAYLOAD: OwnerTypeId = u32::MAX - 9;
