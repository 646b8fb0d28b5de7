use thiserror::Error;

/// Reasons an allocator operation is refused
///
/// A refused operation leaves the allocator untouched.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The base size given to [`Power2Allocator::new`] is not a power of two
    ///
    /// [`Power2Allocator::new`]: struct.Power2Allocator.html#method.new
    #[error("base size {0} is not a power of two")]
    NotPowerOfTwo(u32),

    /// `max_size * slot_count` does not fit in a 32-bit index space
    #[error("{slot_count} slots of {max_size} indices overflow the index space")]
    TooLarge {
        /// Requested base size
        max_size: u32,
        /// Requested number of slots
        slot_count: u32,
    },

    /// The requested size is zero or above what the operation accepts
    #[error("size {size} is outside of 1..={max}")]
    InvalidSize {
        /// Requested size
        size: u32,
        /// Largest size the operation accepts
        max: u32,
    },

    /// A batched operation was asked for zero runs, or for more runs than fit in the index space
    #[error("invalid batch count {0}")]
    InvalidCount(u32),

    /// No free space can satisfy the request
    #[error("no free space for {count} run(s) of {size} indices")]
    OutOfSpace {
        /// Requested size of each run
        size: u32,
        /// Requested number of runs
        count: u32,
    },

    /// The offset is not the start of a live allocation
    #[error("index {0} is not allocated")]
    NotAllocated(u32),

    /// The range to reserve is not entirely free
    #[error("range {offset}+{size} is not entirely free")]
    Conflict {
        /// Start of the requested range
        offset: u32,
        /// Length of the requested range
        size: u32,
    },

    /// Batches of more than one run are only supported for runs of the top size class
    #[error("cannot batch {count} runs of {size} indices below the top size class")]
    Unsupported {
        /// Requested size of each run
        size: u32,
        /// Requested number of runs
        count: u32,
    },
}
