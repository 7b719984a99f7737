//! Dynamic hash map view (spec.md §4.9): `key -> value` over the shared
//! bucket-and-chain table in [`super::hashtable`].
//!
//! Keys are accepted as raw bytes. A fixed-width primitive key (the common
//! case — `u32`, `i64`, ...) is simply its little-endian encoding; a string
//! key is its UTF-8 bytes. Both work unmodified against the table's
//! length-prefixed entries, so there is no separate string-keyed code path.

use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::hashtable::HashTableView;

pub struct MapView<'a> {
    table: HashTableView<'a>,
    /// Declared key width for primitive keys; informational only — the
    /// table itself is key-length-agnostic.
    #[allow(dead_code)]
    key_size: u32,
}

impl<'a> MapView<'a> {
    pub fn new(allocator: &'a mut TlsfAllocator, control_slot: Pointer, root_ptr: Pointer, key_size: u32, value_size: u32) -> Self {
        Self { table: HashTableView { allocator, control_slot, root_ptr, value_size }, key_size }
    }

    pub fn len(&self) -> u32 {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.table.has(key)
    }

    pub fn get_bytes(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.table.get(key)
    }

    pub fn set_bytes(&mut self, key: &[u8], value: &[u8]) {
        self.table.set(key, value);
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.table.delete(key)
    }

    /// Inserts a zero-valued entry for `key` if absent, then returns its
    /// value slot for in-place mutation (spec.md §4.9 `emplace`: "inserts a
    /// default element and returns a mutable view of it"). Updating an
    /// existing key's value through the returned slot is equivalent to
    /// `set_bytes` with the new bytes.
    pub fn emplace_bytes(&mut self, key: &[u8]) -> &mut [u8] {
        let zeros = vec![0u8; self.table.value_size as usize];
        let entry = if self.table.has(key) { self.table.set(key, &self.table.get(key).unwrap()) } else { self.table.set(key, &zeros) };
        let key_len = key.len() as u32;
        let start = (entry + 8 + key_len) as usize;
        let size = self.table.value_size as usize;
        &mut self.table.allocator.buffer_mut()[start..start + size]
    }

    pub fn iterate_bytes(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.table.iterate()
    }

    // ---- u32-value convenience (spec.md §8 S4's string-keyed counter map) --

    pub fn get_u32(&self, key: &[u8]) -> Option<u32> {
        self.table.get(key).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn set_u32(&mut self, key: &[u8], value: u32) {
        self.table.set(key, &value.to_le_bytes());
    }

    pub fn iterate_u32(&self) -> Vec<(Vec<u8>, u32)> {
        self.table
            .iterate()
            .into_iter()
            .map(|(k, v)| (k, u32::from_le_bytes(v.try_into().unwrap())))
            .collect()
    }

    pub fn free(&mut self) {
        self.table.free();
    }
}
