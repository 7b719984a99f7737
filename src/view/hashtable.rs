//! Shared bucket-and-chain hash table backing both [`super::map::MapView`]
//! and [`super::set::SetView`] (spec.md §4.9). A `MapView` is this table
//! with `value_size > 0`; a `SetView` is the same table with `value_size ==
//! 0` and no value-reading surface.
//!
//! Entries are length-prefixed on the key (`next:u32 | key_len:u32 |
//! key_bytes[key_len] | value_bytes[value_size]`) rather than the spec's
//! literal fixed `key(key_size)`, so the same entry layout serves both
//! fixed-width primitive keys and variable-length string keys (spec.md §8
//! S4 uses string keys) — each entry is its own TLSF allocation, so varying
//! its size per key costs nothing.
//!
//! As in [`super::array`], `set`/`maybe_resize`/`ensure_allocated`'s
//! allocations are treated as infallible — spec.md §4.9 defines no error
//! case for `set`, so exhausting the pool here panics rather than
//! propagating `Err`.

use crate::tlsf::block::{read_u32, write_u32};
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::owners;

const COUNT_OFFSET: u32 = 0;
const BUCKET_CAPACITY_OFFSET: u32 = 4;
const BUCKETS_PTR_OFFSET: u32 = 8;
const CONTROL_BLOCK_SIZE: u32 = 12;
const MIN_BUCKET_CAPACITY: u32 = 8;

const ENTRY_NEXT_OFFSET: u32 = 0;
const ENTRY_KEY_LEN_OFFSET: u32 = 4;
const ENTRY_KEY_OFFSET: u32 = 8;

/// FNV-1a over raw bytes (spec.md §4.9). Strings hash their UTF-8 bytes;
/// fixed-width keys hash their little-endian encoding.
pub(crate) fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

pub(crate) struct HashTableView<'a> {
    pub(crate) allocator: &'a mut TlsfAllocator,
    pub(crate) control_slot: Pointer,
    pub(crate) root_ptr: Pointer,
    pub(crate) value_size: u32,
}

impl<'a> HashTableView<'a> {
    fn control_ptr(&self) -> Pointer {
        read_u32(self.allocator.buffer(), self.control_slot)
    }

    fn set_control_ptr(&mut self, ptr: Pointer) {
        write_u32(self.allocator.buffer_mut(), self.control_slot, ptr);
    }

    pub(crate) fn len(&self) -> u32 {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp + COUNT_OFFSET)
        }
    }

    pub(crate) fn bucket_capacity(&self) -> u32 {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp + BUCKET_CAPACITY_OFFSET)
        }
    }

    fn buckets_ptr(&self) -> Pointer {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp + BUCKETS_PTR_OFFSET)
        }
    }

    fn set_len(&mut self, n: u32) {
        let cp = self.control_ptr();
        write_u32(self.allocator.buffer_mut(), cp + COUNT_OFFSET, n);
    }

    fn bucket_head(&self, bucket: u32) -> Pointer {
        read_u32(self.allocator.buffer(), self.buckets_ptr() + bucket * 4)
    }

    fn set_bucket_head(&mut self, bucket: u32, entry: Pointer) {
        let buckets = self.buckets_ptr();
        write_u32(self.allocator.buffer_mut(), buckets + bucket * 4, entry);
    }

    fn entry_next(&self, entry: Pointer) -> Pointer {
        read_u32(self.allocator.buffer(), entry + ENTRY_NEXT_OFFSET)
    }

    fn set_entry_next(&mut self, entry: Pointer, next: Pointer) {
        write_u32(self.allocator.buffer_mut(), entry + ENTRY_NEXT_OFFSET, next);
    }

    fn entry_key_len(&self, entry: Pointer) -> u32 {
        read_u32(self.allocator.buffer(), entry + ENTRY_KEY_LEN_OFFSET)
    }

    pub(crate) fn entry_key<'b>(&'b self, entry: Pointer) -> &'b [u8] {
        let len = self.entry_key_len(entry) as usize;
        let start = (entry + ENTRY_KEY_OFFSET) as usize;
        &self.allocator.buffer()[start..start + len]
    }

    pub(crate) fn entry_value<'b>(&'b self, entry: Pointer) -> &'b [u8] {
        let key_len = self.entry_key_len(entry);
        let start = (entry + ENTRY_KEY_OFFSET + key_len) as usize;
        &self.allocator.buffer()[start..start + self.value_size as usize]
    }

    fn entry_size(&self, key_len: u32) -> u32 {
        ENTRY_KEY_OFFSET + key_len + self.value_size
    }

    fn ensure_allocated(&mut self) {
        if self.control_ptr() != 0 {
            return;
        }
        let cp = self
            .allocator
            .allocate(CONTROL_BLOCK_SIZE, owners::MAP_CONTROL, Some(self.root_ptr))
            .expect("map control block allocation should not exhaust the pool under normal test sizes");
        self.set_control_ptr(cp);
        self.alloc_buckets(MIN_BUCKET_CAPACITY);
    }

    fn alloc_buckets(&mut self, capacity: u32) {
        let cp = self.control_ptr();
        let buckets = self
            .allocator
            .allocate(capacity * 4, owners::MAP_BUCKETS, Some(self.root_ptr))
            .expect("bucket array allocation should not exhaust the pool under normal test sizes");
        write_u32(self.allocator.buffer_mut(), cp + BUCKET_CAPACITY_OFFSET, capacity);
        write_u32(self.allocator.buffer_mut(), cp + BUCKETS_PTR_OFFSET, buckets);
        for i in 0..capacity {
            write_u32(self.allocator.buffer_mut(), buckets + i * 4, 0);
        }
    }

    fn find(&self, key: &[u8]) -> Option<Pointer> {
        let cap = self.bucket_capacity();
        if cap == 0 {
            return None;
        }
        let bucket = fnv1a(key) % cap;
        let mut entry = self.bucket_head(bucket);
        while entry != 0 {
            if self.entry_key(entry) == key {
                return Some(entry);
            }
            entry = self.entry_next(entry);
        }
        None
    }

    pub(crate) fn has(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.find(key).map(|e| self.entry_value(e).to_vec())
    }

    /// Inserts or updates `key` → `value`. Returns the entry pointer so a
    /// caller (e.g. `emplace`) can write further bytes into the value slot.
    pub(crate) fn set(&mut self, key: &[u8], value: &[u8]) -> Pointer {
        self.ensure_allocated();
        if let Some(entry) = self.find(key) {
            let start = (entry + ENTRY_KEY_OFFSET + key.len() as u32) as usize;
            self.allocator.buffer_mut()[start..start + value.len()].copy_from_slice(value);
            return entry;
        }
        self.maybe_resize();
        let cap = self.bucket_capacity();
        let bucket = fnv1a(key) % cap;
        let size = self.entry_size(key.len() as u32);
        let entry = self
            .allocator
            .allocate(size, owners::MAP_ENTRY, Some(self.root_ptr))
            .expect("map entry allocation should not exhaust the pool under normal test sizes");
        write_u32(self.allocator.buffer_mut(), entry + ENTRY_KEY_LEN_OFFSET, key.len() as u32);
        let key_start = (entry + ENTRY_KEY_OFFSET) as usize;
        self.allocator.buffer_mut()[key_start..key_start + key.len()].copy_from_slice(key);
        let value_start = key_start + key.len();
        self.allocator.buffer_mut()[value_start..value_start + value.len()].copy_from_slice(value);
        let head = self.bucket_head(bucket);
        self.set_entry_next(entry, head);
        self.set_bucket_head(bucket, entry);
        self.set_len(self.len() + 1);
        entry
    }

    pub(crate) fn delete(&mut self, key: &[u8]) -> bool {
        let cap = self.bucket_capacity();
        if cap == 0 {
            return false;
        }
        let bucket = fnv1a(key) % cap;
        let mut prev = 0u32;
        let mut entry = self.bucket_head(bucket);
        while entry != 0 {
            let next = self.entry_next(entry);
            if self.entry_key(entry) == key {
                if prev == 0 {
                    self.set_bucket_head(bucket, next);
                } else {
                    self.set_entry_next(prev, next);
                }
                self.allocator.free(entry);
                self.set_len(self.len() - 1);
                return true;
            }
            prev = entry;
            entry = next;
        }
        false
    }

    /// Every `(key, value)` pair, bucket-then-chain order (spec.md §4.9).
    pub(crate) fn iterate(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let cap = self.bucket_capacity();
        let mut out = Vec::with_capacity(self.len() as usize);
        for bucket in 0..cap {
            let mut entry = self.bucket_head(bucket);
            while entry != 0 {
                out.push((self.entry_key(entry).to_vec(), self.entry_value(entry).to_vec()));
                entry = self.entry_next(entry);
            }
        }
        out
    }

    /// Doubles `bucket_capacity` and rehashes every chain when
    /// `count * 4 > bucket_capacity * 3` (a 0.75 load factor — spec.md §4.9
    /// fixes this as a baseline; §9 permits another value).
    fn maybe_resize(&mut self) {
        let cap = self.bucket_capacity();
        if cap == 0 || (self.len() + 1) * 4 <= cap * 3 {
            return;
        }
        let old_buckets = self.buckets_ptr();
        let old_cap = cap;
        let new_cap = cap * 2;
        let cp = self.control_ptr();
        let new_buckets = self
            .allocator
            .allocate(new_cap * 4, owners::MAP_BUCKETS, Some(self.root_ptr))
            .expect("bucket resize should not exhaust the pool under normal test sizes");
        for i in 0..new_cap {
            write_u32(self.allocator.buffer_mut(), new_buckets + i * 4, 0);
        }
        write_u32(self.allocator.buffer_mut(), cp + BUCKET_CAPACITY_OFFSET, new_cap);
        write_u32(self.allocator.buffer_mut(), cp + BUCKETS_PTR_OFFSET, new_buckets);
        #[cfg(feature = "logging")]
        tracing::debug!(old_cap, new_cap, "hashtable: resized bucket array");

        for old_bucket in 0..old_cap {
            let mut entry = read_u32(self.allocator.buffer(), old_buckets + old_bucket * 4);
            while entry != 0 {
                let next = self.entry_next(entry);
                let new_bucket = fnv1a(self.entry_key(entry)) % new_cap;
                let head = read_u32(self.allocator.buffer(), new_buckets + new_bucket * 4);
                self.set_entry_next(entry, head);
                write_u32(self.allocator.buffer_mut(), new_buckets + new_bucket * 4, entry);
                entry = next;
            }
        }
        self.allocator.free(old_buckets);
    }

    /// Frees every entry, the bucket array, and the control block.
    pub(crate) fn free(&mut self) {
        let cp = self.control_ptr();
        if cp == 0 {
            return;
        }
        let cap = self.bucket_capacity();
        let buckets = self.buckets_ptr();
        for bucket in 0..cap {
            let mut entry = read_u32(self.allocator.buffer(), buckets + bucket * 4);
            while entry != 0 {
                let next = self.entry_next(entry);
                self.allocator.free(entry);
                entry = next;
            }
        }
        if buckets != 0 {
            self.allocator.free(buckets);
        }
        self.allocator.free(cp);
        self.set_control_ptr(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_alloc() -> TlsfAllocator {
        TlsfAllocator::new(vec![0u8; 16384]).unwrap()
    }

    #[test]
    fn set_get_delete_roundtrip() {
        let mut alloc = new_alloc();
        let rec = alloc.allocate(4, 0, None).unwrap();
        let mut t = HashTableView { allocator: &mut alloc, control_slot: rec, root_ptr: rec, value_size: 4 };
        t.set(b"k0", &0u32.to_le_bytes());
        t.set(b"k1", &1u32.to_le_bytes());
        assert!(t.has(b"k0"));
        assert_eq!(t.get(b"k1"), Some(1u32.to_le_bytes().to_vec()));
        assert!(t.delete(b"k0"));
        assert!(!t.has(b"k0"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn resize_doubles_bucket_capacity_under_load() {
        let mut alloc = new_alloc();
        let rec = alloc.allocate(4, 0, None).unwrap();
        let mut t = HashTableView { allocator: &mut alloc, control_slot: rec, root_ptr: rec, value_size: 4 };
        for i in 0..16u32 {
            let key = format!("k{i}");
            t.set(key.as_bytes(), &i.to_le_bytes());
        }
        assert_eq!(t.len(), 16);
        assert!(t.bucket_capacity() > MIN_BUCKET_CAPACITY);
        for i in 0..16u32 {
            let key = format!("k{i}");
            assert_eq!(t.get(key.as_bytes()), Some(i.to_le_bytes().to_vec()));
        }
    }

    #[test]
    fn iterate_visits_every_live_key_once() {
        let mut alloc = new_alloc();
        let rec = alloc.allocate(4, 0, None).unwrap();
        let mut t = HashTableView { allocator: &mut alloc, control_slot: rec, root_ptr: rec, value_size: 4 };
        t.set(b"a", &1u32.to_le_bytes());
        t.set(b"b", &2u32.to_le_bytes());
        t.set(b"c", &3u32.to_le_bytes());
        let mut keys: Vec<String> = t.iterate().into_iter().map(|(k, _)| String::from_utf8(k).unwrap()).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
