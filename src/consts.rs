/// Width of the index space
pub const INDEX_BITS: u32 = 32;

/// Upper bound on the number of size classes
///
/// The largest accepted `max_size` is `1 << 31`, which needs classes `0..=31`
pub const MAX_FREE_LISTS: u32 = INDEX_BITS;

/// Largest base size (`max_size`) an allocator can be created with
pub const MAX_BASE_SIZE: u32 = 1 << (MAX_FREE_LISTS - 1);
