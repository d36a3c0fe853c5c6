//! Power-of-two alignment helpers

/// Check that `value` is a non-zero power of two
#[inline(always)]
#[must_use]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && (value & (value - 1)) == 0
}

/// Round `value` up to the next multiple of `align`
///
/// `align` must be a power of two. Returns `None` on overflow.
#[inline(always)]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(is_power_of_two(align), "alignment must be a power of two");
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
