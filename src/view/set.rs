//! Dynamic hash set view (spec.md §4.9): keys only, no value slot. Reuses
//! the same bucket-and-chain table as [`super::map::MapView`] with
//! `value_size == 0`.

use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::hashtable::HashTableView;

pub struct SetView<'a> {
    table: HashTableView<'a>,
    #[allow(dead_code)]
    key_size: u32,
}

impl<'a> SetView<'a> {
    pub fn new(allocator: &'a mut TlsfAllocator, control_slot: Pointer, root_ptr: Pointer, key_size: u32) -> Self {
        Self { table: HashTableView { allocator, control_slot, root_ptr, value_size: 0 }, key_size }
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

    /// Inserts `key`. A no-op (returns `false`) if already present.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        if self.table.has(key) {
            return false;
        }
        self.table.set(key, &[]);
        true
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.table.delete(key)
    }

    pub fn iterate(&self) -> Vec<Vec<u8>> {
        self.table.iterate().into_iter().map(|(k, _)| k).collect()
    }

    pub fn free(&mut self) {
        self.table.free();
    }
}
