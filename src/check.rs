use alloc::vec::Vec;

use thiserror::Error;

use crate::{util, Power2Allocator};

/// A broken internal invariant, as reported by [`Power2Allocator::check`]
///
/// [`Power2Allocator::check`]: struct.Power2Allocator.html#method.check
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Violation {
    /// A free piece is too long or too short for its size class
    #[error("free piece {offset}+{len} does not belong to size class {class}")]
    ClassBound {
        /// Size class holding the piece
        class: u32,
        /// Start of the piece
        offset: u32,
        /// Length of the piece
        len: u32,
    },

    /// A free piece starts at an offset with fewer trailing zeros than its size class
    #[error("free piece at {offset} is not aligned to size class {class}")]
    Misaligned {
        /// Size class holding the piece
        class: u32,
        /// Start of the piece
        offset: u32,
    },

    /// A live allocation has size zero
    #[error("allocation at {offset} is empty")]
    EmptyAllocation {
        /// Start of the allocation
        offset: u32,
    },

    /// Two ranges (free or allocated) cover the same index
    #[error("index {index} is covered more than once")]
    Overlap {
        /// First index covered twice
        index: u32,
    },

    /// Indices that are neither free nor allocated
    #[error("indices {start}..{end} are neither free nor allocated")]
    Gap {
        /// First uncovered index
        start: u64,
        /// End of the uncovered range
        end: u64,
    },

    /// A range runs past the end of the index space
    #[error("ranges extend to {end}, past the end of the index space")]
    OutOfBounds {
        /// End of the furthest range
        end: u64,
    },

    /// A free gap between allocations is not split the way `insert_run` splits it
    #[error("free gap {offset}+{len} is not split canonically")]
    Layout {
        /// Start of the free gap
        offset: u32,
        /// Length of the free gap
        len: u32,
    },
}

impl Power2Allocator {
    /// Verifies every internal invariant of the allocator
    ///
    /// - each free piece fits its size class and is aligned to it
    /// - free pieces and allocations cover `0..total_size` exactly once
    /// - each free gap between allocations is split exactly as inserting it as one run would split
    ///   it, which is what `release` and `reserve` rely on
    ///
    /// This walks every index structure; it is meant for tests and for the `check-invariants`
    /// feature, not for hot paths.
    pub fn check(&self) -> Result<(), Violation> {
        let mut ranges = Vec::with_capacity(self.free.len() + self.inuse.len());

        for (class, offset, len) in self.free.iter() {
            let full = 1u64 << class;
            if len == 0 || u64::from(len) > full || u64::from(len) <= full >> 1 {
                return Err(Violation::ClassBound { class, offset, len });
            }

            if offset != 0 && util::ctz(offset) < class {
                return Err(Violation::Misaligned { class, offset });
            }

            ranges.push((offset, len));
        }

        for (offset, size) in self.inuse.iter() {
            if size == 0 {
                return Err(Violation::EmptyAllocation { offset });
            }

            ranges.push((offset, size));
        }

        // coverage
        ranges.sort_unstable();
        let mut cursor = 0u64;
        for &(offset, len) in &ranges {
            let start = u64::from(offset);
            if start < cursor {
                return Err(Violation::Overlap { index: offset });
            }
            if start > cursor {
                return Err(Violation::Gap { start: cursor, end: start });
            }
            cursor = start + u64::from(len);
        }

        let total = u64::from(self.total_size);
        if cursor < total {
            return Err(Violation::Gap {
                start: cursor,
                end: total,
            });
        }
        if cursor > total {
            return Err(Violation::OutOfBounds { end: cursor });
        }

        // layout
        let mut pieces = 0;
        let mut start = 0;
        let gaps = self
            .inuse
            .iter()
            .map(|(offset, size)| (offset, offset + size))
            .chain(Some((self.total_size, self.total_size)));
        for (end, next_start) in gaps {
            let len = end - start;
            for chunk in self.free.chunks(start, len) {
                if self.free.list(chunk.class).get(chunk.offset) != Some(chunk.len) {
                    return Err(Violation::Layout { offset: start, len });
                }
                pieces += 1;
            }
            start = next_start;
        }

        if pieces != self.free.len() {
            // coverage already holds so this can only be a stray piece
            return Err(Violation::Layout {
                offset: 0,
                len: self.total_size,
            });
        }

        Ok(())
    }
}
