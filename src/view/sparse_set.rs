//! Sparse set view (spec.md §4.10): a dense `u32` array of live ids plus a
//! sparse `u32` array mapping `id -> index into dense`, giving O(1)
//! add/remove/has via the classic swap-removal trick. `count` is simply the
//! dense array's own length — reusing [`ArrayView`] for both halves means
//! there is no separate counter to keep in sync.
//!
//! `ensure_allocated`'s control-block allocation is infallible by contract,
//! as in [`ArrayView`]: spec.md §4.10 defines no error case for `add`.

use crate::tlsf::block::read_u32;
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::array::ArrayView;
use crate::view::owners;

const DENSE_SLOT_OFFSET: u32 = 0;
const SPARSE_SLOT_OFFSET: u32 = 4;
const CONTROL_BLOCK_SIZE: u32 = 8;

pub struct SparseSetView<'a> {
    allocator: &'a mut TlsfAllocator,
    control_slot: Pointer,
    root_ptr: Pointer,
}

impl<'a> SparseSetView<'a> {
    pub fn new(allocator: &'a mut TlsfAllocator, control_slot: Pointer, root_ptr: Pointer) -> Self {
        Self { allocator, control_slot, root_ptr }
    }

    fn control_ptr(&self) -> Pointer {
        read_u32(self.allocator.buffer(), self.control_slot)
    }

    fn ensure_allocated(&mut self) -> Pointer {
        let cp = self.control_ptr();
        if cp != 0 {
            return cp;
        }
        let cp = self
            .allocator
            .allocate(CONTROL_BLOCK_SIZE, owners::SPARSE_SET_CONTROL, Some(self.root_ptr))
            .expect("sparse set control block allocation should not exhaust the pool under normal test sizes");
        crate::tlsf::block::write_u32(self.allocator.buffer_mut(), self.control_slot, cp);
        cp
    }

    fn dense(&mut self) -> ArrayView<'_> {
        let cp = self.ensure_allocated();
        ArrayView::new(self.allocator, cp + DENSE_SLOT_OFFSET, self.root_ptr, 4)
    }

    fn sparse(&mut self) -> ArrayView<'_> {
        let cp = self.ensure_allocated();
        ArrayView::new(self.allocator, cp + SPARSE_SLOT_OFFSET, self.root_ptr, 4)
    }

    pub fn len(&self) -> u32 {
        let cp = self.control_ptr();
        if cp == 0 {
            return 0;
        }
        let dense_cp = read_u32(self.allocator.buffer(), cp + DENSE_SLOT_OFFSET);
        if dense_cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), dense_cp)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&mut self, id: u32) -> bool {
        let idx = {
            let sparse = self.sparse();
            if id >= sparse.length() {
                return false;
            }
            sparse.get_u32(id).unwrap()
        };
        let dense = self.dense();
        idx < dense.length() && dense.get_u32(idx) == Some(id)
    }

    /// Appends `id` to dense and records its index in sparse, growing sparse
    /// with placeholder zeros as needed. Returns `false` if already present.
    pub fn add(&mut self, id: u32) -> bool {
        if self.has(id) {
            return false;
        }
        let new_index = self.dense().length();
        {
            let mut sparse = self.sparse();
            while sparse.length() <= id {
                sparse.push_u32(0);
            }
            sparse.set_u32(id, new_index);
        }
        self.dense().push_u32(id);
        true
    }

    /// Swap-removes `id`: the last dense element takes its slot, and the
    /// displaced id's sparse entry is updated to match (spec.md §4.10).
    pub fn remove(&mut self, id: u32) -> bool {
        if !self.has(id) {
            return false;
        }
        let idx = self.sparse().get_u32(id).unwrap();
        let last_index = self.dense().length() - 1;
        let last_value = self.dense().get_u32(last_index).unwrap();
        self.dense().set_u32(idx, last_value);
        self.sparse().set_u32(last_value, idx);
        self.dense().pop_u32();
        true
    }

    /// Every live id, in dense order.
    pub fn iterate(&mut self) -> Vec<u32> {
        self.dense().snapshot().chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect()
    }

    /// Resets to empty by freeing both backing arrays outright (spec.md
    /// §4.10 `clear`); they are lazily reallocated on the next `add`.
    pub fn clear(&mut self) {
        self.dense().free();
        self.sparse().free();
    }

    pub fn free(&mut self) {
        if self.control_ptr() == 0 {
            return;
        }
        self.dense().free();
        self.sparse().free();
        let cp = self.control_ptr();
        self.allocator.free(cp);
        crate::tlsf::block::write_u32(self.allocator.buffer_mut(), self.control_slot, 0);
    }
}
