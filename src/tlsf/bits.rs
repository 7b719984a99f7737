//! Bit utilities: find-first-set / find-last-set over 32-bit words
//! (spec.md §4.1).

/// Index of the lowest set bit of `w`.
///
/// # Panics
///
/// Debug-asserts `w != 0`; callers that cannot guarantee a non-zero word
/// must check before calling, matching the spec's "both assume `w != 0`"
/// contract.
#[inline]
pub const fn ffs32(w: u32) -> u32 {
    debug_assert!(w != 0);
    w.trailing_zeros()
}

/// Index of the highest set bit of `w`.
///
/// # Panics
///
/// Debug-asserts `w != 0`, mirroring [`ffs32`].
#[inline]
pub const fn fls32(w: u32) -> u32 {
    debug_assert!(w != 0);
    31 - w.leading_zeros()
}
