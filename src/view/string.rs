//! Dynamic string view (spec.md §4.7): `length:u32 | bytes[length]` behind a
//! single control pointer stored in the parent field slot.
//!
//! `set_value`'s allocate/reallocate calls are infallible by contract, as in
//! [`super::array`]: spec.md §4.7 defines no error case for a string write,
//! so a pool too small to hold it is a caller bug that panics rather than
//! returning `Err`.

use crate::tlsf::block::{read_u32, write_u32};
use crate::tlsf::{Pointer, TlsfAllocator};
use crate::view::owners;

pub struct StringView<'a> {
    allocator: &'a mut TlsfAllocator,
    /// Byte offset, inside `allocator`'s buffer, of the `u32` control
    /// pointer this view reads/writes. `0` at that location means "empty,
    /// no allocation" (spec.md §3.6).
    control_slot: Pointer,
    /// The owning root record's user pointer, recorded as the parent of any
    /// control-block allocation this view creates.
    root_ptr: Pointer,
}

impl<'a> StringView<'a> {
    pub fn new(allocator: &'a mut TlsfAllocator, control_slot: Pointer, root_ptr: Pointer) -> Self {
        Self { allocator, control_slot, root_ptr }
    }

    fn control_ptr(&self) -> Pointer {
        read_u32(self.allocator.buffer(), self.control_slot)
    }

    fn set_control_ptr(&mut self, ptr: Pointer) {
        write_u32(self.allocator.buffer_mut(), self.control_slot, ptr);
    }

    /// UTF-8 byte length; `0` for the empty/unallocated state.
    pub fn len(&self) -> u32 {
        let cp = self.control_ptr();
        if cp == 0 {
            0
        } else {
            read_u32(self.allocator.buffer(), cp)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the stored bytes as UTF-8. Spec.md §4.7 guarantees the bytes
    /// were encoded from a `&str` by [`Self::set_value`], so this never
    /// fails in practice; a corrupt buffer is treated as a bug, not a
    /// recoverable error, matching the rest of the view layer's "trust the
    /// allocator's own invariants" stance.
    pub fn value(&self) -> String {
        let cp = self.control_ptr();
        if cp == 0 {
            return String::new();
        }
        let len = read_u32(self.allocator.buffer(), cp) as usize;
        let start = cp as usize + 4;
        String::from_utf8(self.allocator.buffer()[start..start + len].to_vec())
            .expect("string view payload was not valid UTF-8")
    }

    /// Reallocates the control block to fit `s` and re-encodes it. Setting
    /// the empty string frees the control block and zeroes the slot,
    /// matching spec.md §3.6's "empty strings may elide the allocation".
    pub fn set_value(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let new_len = bytes.len() as u32;
        let old_cp = self.control_ptr();

        if new_len == 0 {
            if old_cp != 0 {
                self.allocator.free(old_cp);
            }
            self.set_control_ptr(0);
            return;
        }

        let needed = 4 + new_len;
        let new_cp = if old_cp != 0 {
            self.allocator
                .reallocate(old_cp, needed, owners::STRING_BUFFER, Some(self.root_ptr))
                .expect("string grow should not exhaust the pool under normal test sizes")
        } else {
            self.allocator
                .allocate(needed, owners::STRING_BUFFER, Some(self.root_ptr))
                .expect("string allocate should not exhaust the pool under normal test sizes")
        };
        write_u32(self.allocator.buffer_mut(), new_cp, new_len);
        let start = new_cp as usize + 4;
        self.allocator.buffer_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        self.set_control_ptr(new_cp);
    }

    /// Frees the control block (if any) and zeroes the slot.
    pub fn free(&mut self) {
        let cp = self.control_ptr();
        if cp != 0 {
            self.allocator.free(cp);
            self.set_control_ptr(0);
        }
    }

    /// Transfers ownership of the control pointer out of this slot without
    /// freeing it, zeroing the slot in the process (spec.md §4.7 "swap by
    /// pointer").
    pub fn take_control_ptr(&mut self) -> Pointer {
        let cp = self.control_ptr();
        self.set_control_ptr(0);
        cp
    }

    /// Adopts `ptr` as this slot's control block, freeing whatever was there
    /// before.
    pub fn adopt_control_ptr(&mut self, ptr: Pointer) {
        self.free();
        self.set_control_ptr(ptr);
    }
}
