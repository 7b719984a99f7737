//! Dynamic array view (spec.md §4.8): a `{length, capacity, elements_ptr}`
//! control block plus a separately allocated, contiguous elements buffer.
//!
//! `push`/`grow_to`/`ensure_allocated` assume the backing pool has room:
//! spec.md §4.8 declares no error case for `push`, so a control/elements
//! allocation here is infallible by contract — a pool sized too small for
//! the container's growth is a caller bug, not recoverable OOM, and panics
//! via `expect` rather than returning `Err`.

use crate::schema::SchemaLayout;
use crate::tlsf::block::{read_u32, write_u32};
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::owners;
use crate::view::record::RecordView;

const LENGTH_OFFSET: u32 = 0;
const CAPACITY_OFFSET: u32 = 4;
const ELEMENTS_PTR_OFFSET: u32 = 8;
const CONTROL_BLOCK_SIZE: u32 = 12;
const MIN_CAPACITY: u32 = 4;

pub struct ArrayView<'a> {
    allocator: &'a mut TlsfAllocator,
    control_slot: Pointer,
    root_ptr: Pointer,
    /// Byte size of one element — `element_schema.total_size` for record
    /// elements, the primitive's width otherwise (spec.md §3.6).
    stride: u32,
}

impl<'a> ArrayView<'a> {
    pub fn new(allocator: &'a mut TlsfAllocator, control_slot: Pointer, root_ptr: Pointer, stride: u32) -> Self {
        Self { allocator, control_slot, root_ptr, stride }
    }

    fn control_ptr(&self) -> Pointer {
        read_u32(self.allocator.buffer(), self.control_slot)
    }

    fn set_control_ptr(&mut self, ptr: Pointer) {
        write_u32(self.allocator.buffer_mut(), self.control_slot, ptr);
    }

    pub fn length(&self) -> u32 {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp + LENGTH_OFFSET)
        }
    }

    pub fn capacity(&self) -> u32 {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp + CAPACITY_OFFSET)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    fn elements_ptr(&self) -> Pointer {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp + ELEMENTS_PTR_OFFSET)
        }
    }

    fn set_length(&mut self, n: u32) {
        let cp = self.control_ptr();
        write_u32(self.allocator.buffer_mut(), cp + LENGTH_OFFSET, n);
    }

    /// Byte offset of slot `index` inside the elements buffer. Caller must
    /// have checked `index < length`.
    fn slot_offset(&self, index: u32) -> Pointer {
        self.elements_ptr() + index * self.stride
    }

    /// Raw bytes of slot `index`, or `None` if out of range.
    pub fn get_bytes(&self, index: u32) -> Option<&[u8]> {
        if index >= self.length() {
            return None;
        }
        let off = self.slot_offset(index) as usize;
        Some(&self.allocator.buffer()[off..off + self.stride as usize])
    }

    /// Deep-copies `bytes` into slot `index` when in range. Returns whether
    /// the write happened (spec.md §4.8 `set`'s "returns success flag").
    pub fn set_bytes(&mut self, index: u32, bytes: &[u8]) -> bool {
        if index >= self.length() {
            return false;
        }
        let off = self.slot_offset(index) as usize;
        self.allocator.buffer_mut()[off..off + bytes.len()].copy_from_slice(bytes);
        true
    }

    /// A record view over slot `index`, for element types that are
    /// themselves records (nested structs or dynamic-container wrappers).
    pub fn record_element<'b>(
        &'b mut self,
        index: u32,
        element_schema: &'b SchemaLayout,
        registry: &'b crate::schema::SchemaRegistry,
    ) -> Option<RecordView<'b>> {
        if index >= self.length() {
            return None;
        }
        let offset = self.slot_offset(index);
        Some(RecordView { allocator: &mut *self.allocator, offset, schema: element_schema, registry, root_ptr: self.root_ptr })
    }

    fn ensure_allocated(&mut self) {
        if self.control_ptr() == 0 {
            let cp = self
                .allocator
                .allocate(CONTROL_BLOCK_SIZE, owners::ARRAY_CONTROL, Some(self.root_ptr))
                .expect("array control block allocation should not exhaust the pool under normal test sizes");
            self.set_control_ptr(cp);
        }
    }

    /// Doubles capacity (minimum [`MIN_CAPACITY`]), reallocating the
    /// elements buffer, until it holds at least `min_capacity` slots.
    fn grow_to(&mut self, min_capacity: u32) {
        self.ensure_allocated();
        let cp = self.control_ptr();
        let old_capacity = read_u32(self.allocator.buffer(), cp + CAPACITY_OFFSET);
        if old_capacity >= min_capacity {
            return;
        }
        let mut new_capacity = old_capacity.max(MIN_CAPACITY);
        while new_capacity < min_capacity {
            new_capacity *= 2;
        }
        let old_elements = read_u32(self.allocator.buffer(), cp + ELEMENTS_PTR_OFFSET);
        let new_elements = self
            .allocator
            .reallocate(old_elements, new_capacity * self.stride, owners::ARRAY_ELEMENTS, Some(self.root_ptr))
            .expect("array grow should not exhaust the pool under normal test sizes");
        write_u32(self.allocator.buffer_mut(), cp + CAPACITY_OFFSET, new_capacity);
        write_u32(self.allocator.buffer_mut(), cp + ELEMENTS_PTR_OFFSET, new_elements);
        #[cfg(feature = "logging")]
        tracing::debug!(old_capacity, new_capacity, "array: grew elements buffer");
    }

    /// Appends `bytes` (one element's worth), growing if needed.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let len = self.length();
        if len + 1 > self.capacity() {
            self.grow_to(len + 1);
        }
        let off = self.slot_offset(len) as usize;
        self.allocator.buffer_mut()[off..off + bytes.len()].copy_from_slice(bytes);
        self.set_length(len + 1);
    }

    /// Removes and returns the raw bytes of the last element, or `None` when
    /// empty.
    pub fn pop_bytes(&mut self) -> Option<Vec<u8>> {
        let len = self.length();
        if len == 0 {
            return None;
        }
        let off = self.slot_offset(len - 1) as usize;
        let bytes = self.allocator.buffer()[off..off + self.stride as usize].to_vec();
        self.set_length(len - 1);
        Some(bytes)
    }

    // ---- u32-element convenience (the dominant case in spec.md §8 S3) ----

    pub fn get_u32(&self, index: u32) -> Option<u32> {
        self.get_bytes(index).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn set_u32(&mut self, index: u32, value: u32) -> bool {
        self.set_bytes(index, &value.to_le_bytes())
    }

    pub fn push_u32(&mut self, value: u32) {
        self.push_bytes(&value.to_le_bytes());
    }

    pub fn pop_u32(&mut self) -> Option<u32> {
        self.pop_bytes().map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    /// Every element's raw bytes, concatenated in order. Paired with
    /// [`Self::copy_from_bytes`] to implement spec.md §4.8's `copy_from`
    /// without requiring two live views into the same allocator at once —
    /// the caller snapshots the source field, drops that view, then copies
    /// into the destination.
    pub fn snapshot(&self) -> Vec<u8> {
        let len = self.length();
        if len == 0 {
            return Vec::new();
        }
        let off = self.elements_ptr() as usize;
        self.allocator.buffer()[off..off + (len * self.stride) as usize].to_vec()
    }

    /// Deep copy: frees this array's own storage, then resizes to and
    /// repopulates from a `snapshot()` taken from another array of the same
    /// stride (spec.md §4.8 `copy_from`).
    pub fn copy_from_bytes(&mut self, elements: &[u8]) {
        self.free();
        let count = elements.len() as u32 / self.stride;
        for i in 0..count {
            let start = (i * self.stride) as usize;
            self.push_bytes(&elements[start..start + self.stride as usize]);
        }
    }

    /// Frees the elements buffer and control block for a primitive-element
    /// array, then zeroes the parent slot.
    pub fn free(&mut self) {
        let cp = self.control_ptr();
        if cp == 0 {
            return;
        }
        let elements = read_u32(self.allocator.buffer(), cp + ELEMENTS_PTR_OFFSET);
        if elements != 0 {
            self.allocator.free(elements);
        }
        self.allocator.free(cp);
        self.set_control_ptr(0);
    }

    /// As [`Self::free`], but first frees each element's own dynamic
    /// children through `element_schema` (spec.md §4.8 "pop/free release
    /// dynamic children").
    pub fn free_with_schema(&mut self, element_schema: &SchemaLayout, registry: &crate::schema::SchemaRegistry) {
        let len = self.length();
        for i in 0..len {
            let offset = self.slot_offset(i);
            let mut elem = RecordView {
                allocator: &mut *self.allocator,
                offset,
                schema: element_schema,
                registry,
                root_ptr: self.root_ptr,
            };
            elem.free_dynamic_children();
        }
        self.free();
    }
}
