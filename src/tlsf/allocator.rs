//! The TLSF allocator itself (spec.md §4.4): constant-time allocate / free /
//! reallocate over a caller-supplied byte buffer, with block coalescing and
//! O(1) best-fit via the two-level bitmap.
//!
//! Grounded on `allocator/pool.rs`'s `PoolAllocator` for the overall shape
//! (config-free here since the layout is fixed by the size-class table, a
//! `#[cfg(feature = "stats")]` counters block, and test organization) and on
//! `allocator/bump.rs`'s precedent for a `Cell`/plain-field single-threaded
//! design — spec.md §5 rules out concurrent access to one instance, so there
//! is no atomic or lock-based bookkeeping anywhere in this module.

use super::bits::ffs32;
use super::block;
use super::mapping::{mapping_insert, mapping_search};
use super::{
    align_up, Pointer, ALIGN_SIZE, BLOCK_PAYLOAD_MAX_SIZE, BLOCK_PAYLOAD_MIN_SIZE, FL_INDEX_COUNT,
    FREE_LIST_NULL, HEADER_SIZE, SL_INDEX_COUNT,
};
use crate::error::{AllocError, AllocResult};
use crate::registry::OwnerTypeId;

#[cfg(feature = "safety")]
use crate::registry::AllocationRegistry;

/// Live counters maintained under the `stats` feature (spec.md §6
/// `TLSF_STATS`), mirroring `allocator::stats::AllocatorStats`'s shape.
#[cfg(feature = "stats")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsfStats {
    pub live_bytes: u32,
    pub peak_bytes: u32,
    pub alloc_count: u64,
    pub free_count: u64,
    pub realloc_count: u64,
    pub split_count: u64,
    pub merge_count: u64,
}

#[cfg(not(feature = "stats"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlsfStats;

/// One physical block observed by [`TlsfAllocator::walk_pool`].
#[cfg(feature = "stats")]
#[derive(Debug, Clone, Copy)]
pub struct WalkedBlock {
    pub header_offset: u32,
    pub user_ptr: Pointer,
    pub size: u32,
    pub used: bool,
}

/// A two-level segregated-fit allocator over `[region_start, region_end)`
/// of an owned byte buffer.
pub struct TlsfAllocator {
    buffer: Vec<u8>,
    region_start: u32,
    region_end: u32,
    fl_bitmap: u32,
    sl_bitmap: [u32; FL_INDEX_COUNT],
    blocks: [[Pointer; SL_INDEX_COUNT]; FL_INDEX_COUNT],
    #[cfg(feature = "stats")]
    stats: TlsfStats,
    #[cfg(feature = "safety")]
    registry: AllocationRegistry,
}

impl TlsfAllocator {
    /// Builds an allocator over the whole of `buffer`.
    pub fn new(buffer: Vec<u8>) -> AllocResult<Self> {
        let len = buffer.len() as u32;
        Self::with_region(buffer, 0, len)
    }

    /// Builds an allocator over `[region_start, region_start + region_size)`
    /// of `buffer`, so multiple allocators may coexist in disjoint regions
    /// of one larger buffer (spec.md §3.1).
    ///
    /// Fails if the region doesn't fit in `buffer`, or is too small to hold
    /// one minimum-size payload plus the sentinel.
    pub fn with_region(buffer: Vec<u8>, region_start: u32, region_size: u32) -> AllocResult<Self> {
        let buf_len = buffer.len() as u32;
        let region_end = region_start
            .checked_add(region_size)
            .filter(|&end| end <= buf_len)
            .ok_or_else(AllocError::invalid_region)?;

        let min_required = 2 * HEADER_SIZE + BLOCK_PAYLOAD_MIN_SIZE;
        if region_size < min_required {
            return Err(AllocError::invalid_region());
        }

        let mut allocator = Self {
            buffer,
            region_start,
            region_end,
            fl_bitmap: 0,
            sl_bitmap: [0; FL_INDEX_COUNT],
            blocks: [[FREE_LIST_NULL; SL_INDEX_COUNT]; FL_INDEX_COUNT],
            #[cfg(feature = "stats")]
            stats: TlsfStats::default(),
            #[cfg(feature = "safety")]
            registry: AllocationRegistry::new(),
        };
        allocator.init_pool();
        Ok(allocator)
    }

    fn init_pool(&mut self) {
        let free_payload =
            super::align_down(self.region_end - self.region_start - 2 * HEADER_SIZE, ALIGN_SIZE);
        let first_header = self.region_start;
        block::set_payload_size(&mut self.buffer, first_header, free_payload);
        // The sentinel has no physical successor, so it must never be the
        // target of `mark_as_used`/`mark_as_free` (both touch the *next*
        // block's header, which would read past the buffer here). Its own
        // used flag is set directly instead.
        let sentinel_header = block::link_next(&mut self.buffer, first_header);
        block::set_payload_size(&mut self.buffer, sentinel_header, 0);
        block::set_used(&mut self.buffer, sentinel_header);
        block::mark_as_free(&mut self.buffer, first_header);
        self.insert_block(first_header);
        self.region_end = sentinel_header + HEADER_SIZE;
        #[cfg(feature = "logging")]
        tracing::debug!(
            region_start = self.region_start,
            region_end = self.region_end,
            free_payload,
            "tlsf: pool initialized"
        );
    }

    // ---- free-list bookkeeping -------------------------------------------------

    fn insert_block(&mut self, header: u32) {
        let size = block::payload_size(&self.buffer, header);
        let (fl, sl) = mapping_insert(size);
        let head = self.blocks[fl][sl];
        block::set_next_free(&mut self.buffer, header, head);
        block::set_prev_free_link(&mut self.buffer, header, FREE_LIST_NULL);
        if !block::is_null_link(head) {
            block::set_prev_free_link(&mut self.buffer, head, header);
        }
        self.blocks[fl][sl] = header;
        self.sl_bitmap[fl] |= 1 << sl;
        self.fl_bitmap |= 1 << fl;
    }

    fn remove_block(&mut self, header: u32) {
        let size = block::payload_size(&self.buffer, header);
        let (fl, sl) = mapping_insert(size);
        let next = block::next_free(&self.buffer, header);
        let prev = block::prev_free(&self.buffer, header);
        if !block::is_null_link(next) {
            block::set_prev_free_link(&mut self.buffer, next, prev);
        }
        if !block::is_null_link(prev) {
            block::set_next_free(&mut self.buffer, prev, next);
        } else {
            self.blocks[fl][sl] = next;
            if block::is_null_link(next) {
                self.sl_bitmap[fl] &= !(1 << sl);
                if self.sl_bitmap[fl] == 0 {
                    self.fl_bitmap &= !(1 << fl);
                }
            }
        }
    }

    /// Finds the smallest non-empty cell at or above `(fl, sl)`.
    fn search_suitable(&self, fl: usize, sl: usize) -> Option<u32> {
        let mut fl = fl;
        let mut sl_map = self.sl_bitmap[fl] & (!0u32 << sl);
        if sl_map == 0 {
            let fl_map = self.fl_bitmap & (!0u32 << (fl + 1));
            if fl_map == 0 {
                return None;
            }
            fl = ffs32(fl_map) as usize;
            sl_map = self.sl_bitmap[fl];
        }
        let sl = ffs32(sl_map) as usize;
        let header = self.blocks[fl][sl];
        debug_assert!(!block::is_null_link(header));
        Some(header)
    }

    /// Shrinks `header`'s block to `new_size`, marks the leftover remainder
    /// free, merges it with its right neighbor if that is also free, and
    /// files it. `header` itself is left used.
    fn split_and_free_remainder(&mut self, header: u32, new_size: u32) {
        let total = block::payload_size(&self.buffer, header);
        block::set_payload_size(&mut self.buffer, header, new_size);
        let remainder_header = block::link_next(&mut self.buffer, header);
        let remainder_size = total - new_size - HEADER_SIZE;
        block::set_payload_size(&mut self.buffer, remainder_header, remainder_size);
        block::mark_as_free(&mut self.buffer, remainder_header);
        self.merge_right_if_free(remainder_header);
        self.insert_block(remainder_header);
        #[cfg(feature = "logging")]
        tracing::debug!(header, new_size, remainder_size, "tlsf: split block");
        #[cfg(feature = "stats")]
        {
            self.stats.split_count += 1;
        }
    }

    /// Absorbs `header`'s physically next block into it. Caller must have
    /// already removed that neighbor from its free list.
    fn absorb_right(&mut self, header: u32) {
        let right = block::next_header_offset(&self.buffer, header);
        let right_size = block::payload_size(&self.buffer, right);
        let combined = block::payload_size(&self.buffer, header) + HEADER_SIZE + right_size;
        block::set_payload_size(&mut self.buffer, header, combined);
        block::link_next(&mut self.buffer, header);
    }

    fn merge_right_if_free(&mut self, header: u32) -> bool {
        let right = block::next_header_offset(&self.buffer, header);
        if block::is_free(&self.buffer, right) {
            self.remove_block(right);
            self.absorb_right(header);
            #[cfg(feature = "logging")]
            tracing::debug!(header, right, "tlsf: coalesced with right neighbor");
            #[cfg(feature = "stats")]
            {
                self.stats.merge_count += 1;
            }
            true
        } else {
            false
        }
    }

    /// Merges `header` into its left neighbor if that is free, returning
    /// the offset of the (possibly merged) block.
    fn merge_left_if_free(&mut self, header: u32) -> u32 {
        if block::is_prev_free(&self.buffer, header) {
            let left = block::prev_header_offset(&self.buffer, header);
            self.remove_block(left);
            self.absorb_right(left);
            #[cfg(feature = "stats")]
            {
                self.stats.merge_count += 1;
            }
            left
        } else {
            header
        }
    }

    fn validate_live_user_ptr(&self, ptr: Pointer) -> u32 {
        if ptr < self.region_start + HEADER_SIZE || ptr >= self.region_end {
            #[cfg(feature = "logging")]
            tracing::error!(pointer = ptr, "tlsf: pointer outside the managed region");
            panic!("tlsf: pointer {ptr} is outside the managed region");
        }
        let header = block::header_from_user_ptr(ptr);
        if block::is_free(&self.buffer, header) {
            #[cfg(feature = "logging")]
            tracing::error!(pointer = ptr, "tlsf: double free or use-after-free");
            panic!("tlsf: double free or use-after-free at pointer {ptr}");
        }
        header
    }

    // ---- public surface (spec.md §6) -------------------------------------------

    /// Aligns, clamps, and finds a large-enough free block, registers the
    /// new allocation under `owner`/`parent`, zero-fills its payload, and
    /// returns the user pointer. `Err(AllocError::out_of_memory)` when no
    /// class can satisfy the request.
    pub fn allocate(
        &mut self,
        size: u32,
        owner: OwnerTypeId,
        parent: Option<Pointer>,
    ) -> AllocResult<Pointer> {
        #[cfg(not(feature = "safety"))]
        let _ = (owner, parent);
        let aligned = align_up(size.max(1), ALIGN_SIZE).max(BLOCK_PAYLOAD_MIN_SIZE);
        if aligned > BLOCK_PAYLOAD_MAX_SIZE {
            return Err(AllocError::out_of_memory(size));
        }
        let (fl, sl) = mapping_search(aligned).ok_or_else(|| AllocError::out_of_memory(size))?;
        let header = self.search_suitable(fl, sl).ok_or_else(|| AllocError::out_of_memory(size))?;
        self.remove_block(header);

        let block_size = block::payload_size(&self.buffer, header);
        let remainder = block_size - aligned;
        if remainder >= HEADER_SIZE + BLOCK_PAYLOAD_MIN_SIZE {
            self.split_and_free_remainder(header, aligned);
        }
        block::mark_as_used(&mut self.buffer, header);

        let user_ptr = block::user_ptr_from_header(header);
        let payload_len = block::payload_size(&self.buffer, header) as usize;
        let start = user_ptr as usize;
        self.buffer[start..start + payload_len].fill(0);

        #[cfg(feature = "safety")]
        self.registry.register(user_ptr, owner, parent);

        #[cfg(feature = "stats")]
        {
            self.stats.alloc_count += 1;
            self.stats.live_bytes += payload_len as u32;
            self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.live_bytes);
        }

        Ok(user_ptr)
    }

    /// No-op on null. Fatal (panics) on a pointer outside the region or
    /// already free. Stomps the payload in `safety` builds before release.
    pub fn free(&mut self, ptr: Pointer) {
        if ptr == 0 {
            return;
        }
        let header = self.validate_live_user_ptr(ptr);
        let size = block::payload_size(&self.buffer, header);

        #[cfg(feature = "safety")]
        {
            let start = ptr as usize;
            self.buffer[start..start + size as usize].fill(0xCC);
            self.registry.unregister(ptr);
        }

        #[cfg(feature = "stats")]
        {
            self.stats.free_count += 1;
            self.stats.live_bytes -= size;
        }

        block::mark_as_free(&mut self.buffer, header);
        let header = self.merge_left_if_free(header);
        self.merge_right_if_free(header);
        self.insert_block(header);
    }

    /// Grows or shrinks the allocation at `old_ptr`, preferring in-place
    /// shrink/grow over a move; see spec.md §4.4 for the exact path
    /// selection. `new_size == 0` behaves as `free`; `old_ptr == 0` behaves
    /// as `allocate`.
    pub fn reallocate(
        &mut self,
        old_ptr: Pointer,
        new_size: u32,
        owner: OwnerTypeId,
        parent: Option<Pointer>,
    ) -> AllocResult<Pointer> {
        if new_size == 0 {
            self.free(old_ptr);
            return Ok(0);
        }
        if old_ptr == 0 {
            return self.allocate(new_size, owner, parent);
        }

        let header = self.validate_live_user_ptr(old_ptr);
        let aligned = align_up(new_size, ALIGN_SIZE).max(BLOCK_PAYLOAD_MIN_SIZE);
        if aligned > BLOCK_PAYLOAD_MAX_SIZE {
            return Err(AllocError::out_of_memory(new_size));
        }
        let old_size = block::payload_size(&self.buffer, header);
        if aligned == old_size {
            return Ok(old_ptr);
        }

        if aligned < old_size {
            let remainder = old_size - aligned;
            if remainder >= HEADER_SIZE + BLOCK_PAYLOAD_MIN_SIZE {
                self.split_and_free_remainder(header, aligned);
                #[cfg(feature = "stats")]
                {
                    self.stats.live_bytes -= remainder;
                }
            }
            #[cfg(feature = "stats")]
            {
                self.stats.realloc_count += 1;
            }
            return Ok(old_ptr);
        }

        // Grow-in-place: absorb a free right neighbor if it is big enough.
        let next = block::next_header_offset(&self.buffer, header);
        if block::is_free(&self.buffer, next) {
            let next_size = block::payload_size(&self.buffer, next);
            if old_size + HEADER_SIZE + next_size >= aligned {
                self.remove_block(next);
                self.absorb_right(header);
                let combined = block::payload_size(&self.buffer, header);
                let remainder = combined - aligned;
                if remainder >= HEADER_SIZE + BLOCK_PAYLOAD_MIN_SIZE {
                    self.split_and_free_remainder(header, aligned);
                }
                #[cfg(feature = "stats")]
                {
                    let new_size = block::payload_size(&self.buffer, header);
                    self.stats.live_bytes += new_size - old_size;
                    self.stats.peak_bytes = self.stats.peak_bytes.max(self.stats.live_bytes);
                    self.stats.realloc_count += 1;
                }
                return Ok(old_ptr);
            }
        }

        // Move path: allocate fresh, copy, reparent, free the original.
        let new_ptr = self.allocate(new_size, owner, parent)?;

        let new_header = block::header_from_user_ptr(new_ptr);
        let copy_len = old_size.min(block::payload_size(&self.buffer, new_header)) as usize;
        self.buffer.copy_within(old_ptr as usize..old_ptr as usize + copy_len, new_ptr as usize);

        #[cfg(feature = "safety")]
        self.registry.reparent_children(old_ptr, new_ptr);

        self.free(old_ptr);

        #[cfg(feature = "stats")]
        {
            self.stats.realloc_count += 1;
        }

        Ok(new_ptr)
    }

    /// Payload size of the block backing a live pointer; `0` for null.
    pub fn get_allocation_size(&self, ptr: Pointer) -> u32 {
        if ptr == 0 {
            return 0;
        }
        let header = self.validate_live_user_ptr(ptr);
        block::payload_size(&self.buffer, header)
    }

    /// Iterates every physical block from the region start to the sentinel.
    #[cfg(feature = "stats")]
    pub fn walk_pool(&self, mut visitor: impl FnMut(WalkedBlock)) {
        let mut header = self.region_start;
        loop {
            let size = block::payload_size(&self.buffer, header);
            let used = !block::is_free(&self.buffer, header);
            visitor(WalkedBlock {
                header_offset: header,
                user_ptr: block::user_ptr_from_header(header),
                size,
                used,
            });
            if size == 0 && used {
                break; // sentinel
            }
            header = block::next_header_offset(&self.buffer, header);
        }
    }

    /// True iff `[ptr, ptr + size)` fits strictly inside a single
    /// currently-used block.
    #[cfg(feature = "safety")]
    pub fn is_valid_memory_range(&self, ptr: Pointer, size: u32) -> bool {
        if ptr < self.region_start + HEADER_SIZE || ptr >= self.region_end {
            return false;
        }
        let header = block::header_from_user_ptr(ptr);
        if block::is_free(&self.buffer, header) {
            return false;
        }
        let payload = block::payload_size(&self.buffer, header);
        size <= payload
    }

    /// A snapshot of the live counters.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> TlsfStats {
        self.stats
    }

    #[cfg(feature = "safety")]
    pub fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }

    #[cfg(feature = "safety")]
    pub fn registry_mut(&mut self) -> &mut AllocationRegistry {
        &mut self.registry
    }

    /// Read-only access to the backing buffer, for view/inspector code.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable access to the backing buffer, for view write operations.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    pub fn region_start(&self) -> u32 {
        self.region_start
    }

    pub fn region_end(&self) -> u32 {
        self.region_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(size: usize) -> TlsfAllocator {
        TlsfAllocator::new(vec![0u8; size]).unwrap()
    }

    fn alloc(a: &mut TlsfAllocator, size: u32) -> Pointer {
        a.allocate(size, 0, None).unwrap()
    }

    #[test]
    fn new_rejects_too_small_region() {
        assert!(TlsfAllocator::new(vec![0u8; 4]).is_err());
    }

    #[test]
    fn allocate_and_free_roundtrip() {
        let mut a = allocator(256);
        let p = alloc(&mut a, 32);
        assert_ne!(p, 0);
        assert_eq!(a.get_allocation_size(p), 32);
        a.free(p);
    }

    #[test]
    fn allocate_returns_disjoint_pointers() {
        let mut a = allocator(256);
        let p1 = alloc(&mut a, 32);
        let p2 = alloc(&mut a, 16);
        assert!(p1 + 32 <= p2 || p2 + 16 <= p1);
    }

    #[test]
    fn scenario_s1_allocate_free_coalesce() {
        let mut a = allocator(256);
        let x = alloc(&mut a, 32);
        let y = alloc(&mut a, 16);
        assert_ne!(x, y);
        a.free(x);
        a.free(y);
        #[cfg(feature = "stats")]
        {
            let mut free_blocks = 0;
            a.walk_pool(|b| {
                if !b.used {
                    free_blocks += 1;
                }
            });
            assert_eq!(free_blocks, 1);
        }
    }

    #[test]
    fn shrink_then_grow_back_preserves_or_moves_pointer() {
        let mut a = allocator(512);
        let p = alloc(&mut a, 64);
        let p2 = a.reallocate(p, 16, 0, None).unwrap();
        assert_eq!(p2, p);
        assert_eq!(a.get_allocation_size(p2), 16);
    }

    #[test]
    fn reallocate_zero_frees_and_returns_null() {
        let mut a = allocator(256);
        let p = alloc(&mut a, 32);
        let r = a.reallocate(p, 0, 0, None).unwrap();
        assert_eq!(r, 0);
    }

    #[test]
    #[should_panic]
    fn double_free_is_fatal() {
        let mut a = allocator(256);
        let p = alloc(&mut a, 32);
        a.free(p);
        a.free(p);
    }

    fn try_alloc(a: &mut TlsfAllocator, size: u32) -> AllocResult<Pointer> {
        a.allocate(size, 0, None)
    }

    #[test]
    fn out_of_memory_is_recoverable() {
        let mut a = allocator(64);
        assert!(try_alloc(&mut a, 1_000_000).is_err());
    }
}
