//! Size↔class mapping (spec.md §4.3): turns a payload size into the
//! `(first_level, second_level)` index pair identifying its free-list cell.

use super::bits::fls32;
use super::{FL_INDEX_COUNT, FL_INDEX_SHIFT, SL_INDEX_COUNT, SL_INDEX_COUNT_LOG2, SMALL_BLOCK_SIZE};

/// Computes the exact cell a block of `size` bytes belongs to.
///
/// Sizes below [`SMALL_BLOCK_SIZE`] use a flat linear division (`fl == 0`);
/// larger sizes use `floor(log2(size))` for `fl` and the next
/// [`SL_INDEX_COUNT_LOG2`] bits below the leading one for `sl`.
#[inline]
pub(crate) fn mapping_insert(size: u32) -> (usize, usize) {
    if size < SMALL_BLOCK_SIZE {
        let sl = (size / (SMALL_BLOCK_SIZE / SL_INDEX_COUNT as u32)) as usize;
        (0, sl)
    } else {
        let f = fls32(size);
        let sl = ((size >> (f - SL_INDEX_COUNT_LOG2)) ^ (1 << SL_INDEX_COUNT_LOG2)) as usize;
        let fl = (f - FL_INDEX_SHIFT + 1) as usize;
        (fl, sl)
    }
}

/// Rounds `request` up to the next class boundary so that any block stored
/// in the returned cell is guaranteed to satisfy it, then maps it.
///
/// Returns `None` if even the rounded size exceeds what the table can
/// represent — the caller must report allocation failure.
#[inline]
pub(crate) fn mapping_search(request: u32) -> Option<(usize, usize)> {
    let rounded = if request >= SMALL_BLOCK_SIZE {
        let f = fls32(request);
        let round = (1u32 << (f - SL_INDEX_COUNT_LOG2)) - 1;
        request.checked_add(round)?
    } else {
        request
    };
    let (fl, sl) = mapping_insert(rounded);
    if fl >= FL_INDEX_COUNT {
        None
    } else {
        Some((fl, sl))
    }
}
