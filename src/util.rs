use crate::consts;

/// Find Last Set
///
/// `x` must be non-zero
pub fn fls(x: u32) -> u32 {
    debug_assert_ne!(x, 0);

    consts::INDEX_BITS - x.leading_zeros() - 1
}

/// Count Trailing Zeros
///
/// `ctz(0)` is `INDEX_BITS`: offset zero is aligned to every size class
pub fn ctz(x: u32) -> u32 {
    x.trailing_zeros()
}

/// Smallest `k` such that `1 << k >= x`
pub fn ceil_log2(x: u32) -> u32 {
    if x <= 1 {
        0
    } else {
        fls(x - 1) + 1
    }
}

pub fn is_power_of_two(x: u32) -> bool {
    x != 0 && x & (x - 1) == 0
}

// `align` must be a power of two
pub fn align_down(x: u32, align: u32) -> u32 {
    debug_assert!(is_power_of_two(align));

    x & !(align - 1)
}
