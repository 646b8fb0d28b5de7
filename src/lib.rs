//! An allocator of index ranges whose start is aligned to the next power of two of their size
//!
//! Hardware resources such as table rows, queue slots or register banks are often addressed in a
//! way that requires a group of `N` consecutive entries to start at a multiple of
//! `N.next_power_of_two()`. [`Power2Allocator`] hands out such runs from a linear index space
//! `0..total_size` and takes them back, coalescing freed runs with their free neighbors.
//!
//! # Example
//!
//! ```
//! use power2_alloc::{Error, Power2Allocator};
//!
//! // two slots of 1024 indices each: 0..2048
//! let mut alloc = Power2Allocator::new(1024, 2)?;
//!
//! // a run of 3 starts at a multiple of 4
//! let x = alloc.allocate(3)?;
//! assert_eq!(x % 4, 0);
//!
//! // a run of 50 starts at a multiple of 64
//! let y = alloc.allocate(50)?;
//! assert_eq!(y % 64, 0);
//!
//! // replay a layout decided somewhere else
//! alloc.reserve(0, 10)?;
//! assert_eq!(alloc.reserve(5, 1), Err(Error::Conflict { offset: 5, size: 1 }));
//!
//! alloc.release(x)?;
//! assert_eq!(alloc.index_size(x), Err(Error::NotAllocated(x)));
//! assert_eq!(alloc.usage(), 60);
//! # Ok::<(), Error>(())
//! ```
//!
//! # Size classes
//!
//! Free space is kept in one ordered list per size class. Class `c` holds pieces whose length is
//! in `(2^(c-1), 2^c]` and whose offset is a multiple of `2^c`; there are
//! `log2(max_size) + 1` classes. A free run is always stored as the same sequence of pieces: each
//! step carves the largest piece its current offset is aligned to and its remaining length can
//! fill. Because the split only depends on the run's offset and length, a run can be taken out of
//! the free lists again by recomputing that sequence; no per-piece bookkeeping is kept.
//!
//! `allocate(size)` searches the classes from `ceil(log2(size))` upwards for the lowest piece that
//! can hold `size` indices and places the run at the highest suitably aligned offset inside that
//! piece, so leftovers stay at lower addresses.
//!
//! # Cargo features
//!
//! - `ufmt`: implements `ufmt::uDebug` for `Power2Allocator`
//! - `check-invariants`: runs [`Power2Allocator::check`] after every successful mutation and
//!   panics if it fails. This is slow; use it to track down corruption.
//!
//! # Concurrency
//!
//! `Power2Allocator` is a plain value: mutation requires `&mut self` so callers serialize writers
//! the usual way (e.g. behind a `Mutex`). Copies made with [`Power2Allocator::make_copy`] share
//! nothing with the original.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
#![deny(rust_2018_compatibility)]
#![deny(rust_2018_idioms)]

extern crate alloc;

use core::{convert::TryFrom, fmt};

use log::debug;
#[cfg(feature = "ufmt")]
use ufmt::derive::uDebug;

pub use crate::{check::Violation, consts::MAX_BASE_SIZE, error::Error};
use crate::{free_lists::FreeLists, map::SparseMap};

#[macro_use]
mod macros;
mod check;
mod consts;
mod error;
mod free_lists;
mod map;
mod util;

/// Allocator of power-of-two aligned runs over the index space `0..total_size`
#[derive(Clone, PartialEq, Eq)]
pub struct Power2Allocator {
    max_size: u32,
    total_size: u32,
    free: FreeLists,
    // start of each allocation -> its size
    inuse: SparseMap,
}

impl Power2Allocator {
    /* Constructors */
    /// Creates an allocator over `slot_count` slots of `max_size` indices each
    ///
    /// `max_size` must be a power of two; it is also the largest run that can be requested. The
    /// index space is `0..max_size * slot_count`, which must fit in a `u32`.
    pub fn new(max_size: u32, slot_count: u32) -> Result<Self, Error> {
        if !util::is_power_of_two(max_size) {
            return Err(Error::NotPowerOfTwo(max_size));
        }

        let total_size = max_size
            .checked_mul(slot_count)
            .ok_or(Error::TooLarge {
                max_size,
                slot_count,
            })?;

        let mut free = FreeLists::new(util::ceil_log2(max_size) + 1);
        for slot in 0..slot_count {
            free.insert_run(slot * max_size, max_size);
        }

        debug!(
            "power2 allocator: {} slots of {} ({} size classes)",
            slot_count,
            max_size,
            free.count()
        );

        Ok(Power2Allocator {
            max_size,
            total_size,
            free,
            inuse: SparseMap::new(),
        })
    }

    /// Returns a deep copy of this allocator
    ///
    /// The copy has the same free and allocated runs; changes to either one are not visible to
    /// the other.
    pub fn make_copy(&self) -> Self {
        self.clone()
    }

    /* Public API */
    /// Allocates `size` consecutive indices and returns the first one
    ///
    /// The returned offset is a multiple of `size.next_power_of_two()`. `size` must be in
    /// `1..=max_size`.
    pub fn allocate(&mut self, size: u32) -> Result<u32, Error> {
        self.check_size(size)?;

        let class = util::ceil_log2(size);
        let (free_offset, free_len) = (class..self.free.count())
            .find_map(|c| self.free.take_first_fit(c, size))
            .ok_or(Error::OutOfSpace { size, count: 1 })?;

        // the piece's class is at least `class` so `free_offset` is aligned and the highest
        // aligned offset that still fits can't go below it
        let free_end = free_offset + free_len;
        let offset = util::align_down(free_end - size, 1 << class);
        debug_assert!(offset >= free_offset);

        self.free.insert_run(free_offset, offset - free_offset);
        self.free.insert_run(offset + size, free_end - (offset + size));
        self.mark_inuse(offset, size);

        debug!(
            "allocate {}: {} (from {}+{})",
            size, offset, free_offset, free_len
        );
        self.post_check();

        Ok(offset)
    }

    /// Releases the run that starts at `offset`
    ///
    /// The run is merged with the free space on either side of it.
    pub fn release(&mut self, offset: u32) -> Result<(), Error> {
        let size = self.index_size(offset)?;

        self.free_run(offset, size);

        debug!("release {}+{}", offset, size);
        self.post_check();

        Ok(())
    }

    /// Marks `offset..offset + size` as allocated
    ///
    /// This is meant to restore a layout that was computed earlier, e.g. from a snapshot, so the
    /// range does not need to satisfy any alignment. Fails with [`Error::Conflict`] if any index
    /// in the range is already allocated or lies outside of the index space.
    ///
    /// [`Error::Conflict`]: enum.Error.html#variant.Conflict
    pub fn reserve(&mut self, offset: u32, size: u32) -> Result<(), Error> {
        if size == 0 {
            return Err(Error::InvalidSize {
                size,
                max: self.total_size,
            });
        }

        let conflict = Error::Conflict { offset, size };
        if self.inuse.contains(offset) {
            return Err(conflict);
        }

        let (left, right) = self.free_bounds(offset);
        let end = offset.checked_add(size).ok_or(conflict)?;
        if offset < left || end > right {
            return Err(conflict);
        }

        self.free.remove_run(left, right - left);
        self.free.insert_run(left, offset - left);
        self.free.insert_run(end, right - end);
        self.mark_inuse(offset, size);

        debug!("reserve {}+{} (free gap {}..{})", offset, size, left, right);
        self.post_check();

        Ok(())
    }

    /// Allocates `count` runs of `size` indices as one operation and returns the first offset
    ///
    /// The runs start one `max_size` apart and the first one is aligned to
    /// `(size.next_power_of_two() * count).next_power_of_two()`. Either all runs are allocated or
    /// none is.
    ///
    /// With `count > 1` only sizes in the top size class (`size > max_size / 2`) are supported;
    /// smaller sizes fail with [`Error::Unsupported`]. A `count` of 1 is a plain [`allocate`].
    ///
    /// [`Error::Unsupported`]: enum.Error.html#variant.Unsupported
    /// [`allocate`]: struct.Power2Allocator.html#method.allocate
    pub fn allocate_multiple(&mut self, size: u32, count: u32) -> Result<u32, Error> {
        match count {
            0 => return Err(Error::InvalidCount(count)),
            1 => return self.allocate(size),
            _ => {}
        }

        self.check_size(size)?;

        let class = util::ceil_log2(size);
        let top = self.free.top();
        // finding `count` spaced runs in the lower classes would need a first fit search across
        // classes
        if class != top {
            return Err(Error::Unsupported { size, count });
        }

        let out_of_space = Error::OutOfSpace { size, count };
        let span = (1u64 << class) * u64::from(count);
        if span > u64::from(self.total_size) {
            return Err(out_of_space);
        }
        let align = 1u64 << util::ceil_log2(u32::try_from(span).map_err(|_| out_of_space)?);

        let first = self
            .free
            .find_top_class_runs(size, count, align)
            .ok_or(out_of_space)?;

        let stride = 1u32 << top;
        for i in 0..count {
            let offset = first + i * stride;
            match self.free.take(top, offset) {
                Some(len) => {
                    self.free.insert_run(offset + size, len - size);
                    self.mark_inuse(offset, size);
                }
                None => consistency_violation!("top class piece at {} vanished", offset),
            }
        }

        debug!("allocate {} x {}: {}", count, size, first);
        self.post_check();

        Ok(first)
    }

    /// Releases `count` runs that start `max_size` apart from `offset` on, as allocated by
    /// [`allocate_multiple`]
    ///
    /// Nothing is released unless all `count` runs are allocated. A `count` reaching past the end
    /// of the index space is rejected with [`Error::InvalidCount`].
    ///
    /// [`Error::InvalidCount`]: enum.Error.html#variant.InvalidCount
    ///
    /// [`allocate_multiple`]: struct.Power2Allocator.html#method.allocate_multiple
    pub fn release_multiple(&mut self, offset: u32, count: u32) -> Result<(), Error> {
        match count {
            0 => return Err(Error::InvalidCount(count)),
            1 => return self.release(offset),
            _ => {}
        }

        let size = self.index_size(offset)?;
        let top = self.free.top();
        if util::ceil_log2(size) != top {
            return Err(Error::Unsupported { size, count });
        }

        let stride = 1u32 << top;
        let last = u64::from(offset) + u64::from(count - 1) * u64::from(stride);
        if last >= u64::from(self.total_size) {
            return Err(Error::InvalidCount(count));
        }

        if let Some(at) = (1..count)
            .map(|i| offset + i * stride)
            .find(|&at| !self.inuse.contains(at))
        {
            return Err(Error::NotAllocated(at));
        }

        for i in 0..count {
            let at = offset + i * stride;
            if let Some(size) = self.inuse.get(at) {
                self.free_run(at, size);
            }
        }

        debug!("release {} x {}+{}", count, offset, size);
        self.post_check();

        Ok(())
    }

    /* Queries */
    /// Returns the size of the allocation that starts at `offset`
    pub fn index_size(&self, offset: u32) -> Result<u32, Error> {
        self.inuse.get(offset).ok_or(Error::NotAllocated(offset))
    }

    /// Number of live allocations
    pub fn alloc_count(&self) -> usize {
        self.inuse.len()
    }

    /// Number of live allocations of exactly `size` indices
    pub fn alloc_count_by_size(&self, size: u32) -> usize {
        if size > self.max_size {
            return 0;
        }

        self.inuse.iter().filter(|&(_, s)| s == size).count()
    }

    /// Number of allocated indices
    pub fn usage(&self) -> u32 {
        self.inuse.iter().map(|(_, size)| size).sum()
    }

    /// Lowest allocated offset
    pub fn first_alloc(&self) -> Option<u32> {
        self.inuse.first().map(|(offset, _)| offset)
    }

    /// Lowest allocated offset above `offset`
    ///
    /// `offset` doesn't need to be allocated itself, so iteration can resume from any point.
    pub fn next_alloc(&self, offset: u32) -> Option<u32> {
        self.inuse.next(offset).map(|(offset, _)| offset)
    }

    /// Iterates over `(offset, size)` of the live allocations in ascending order
    pub fn allocations(&self) -> Allocations<'_> {
        Allocations {
            inner: self.inuse.iter(),
        }
    }

    /// Iterates over `(class, offset, len)` of the free pieces, class by class
    pub fn free_runs(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.free.iter()
    }

    /// Number of free pieces across all size classes
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /* Getters */
    /// Largest run that can be requested; the size of one slot
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Size of the index space
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Number of size classes
    pub fn free_list_count(&self) -> u32 {
        self.free.count()
    }

    /* Private API */
    fn check_size(&self, size: u32) -> Result<(), Error> {
        if size == 0 || size > self.max_size {
            Err(Error::InvalidSize {
                size,
                max: self.max_size,
            })
        } else {
            Ok(())
        }
    }

    /// End of the allocation before `offset` and start of the one after it
    fn free_bounds(&self, offset: u32) -> (u32, u32) {
        let left = self
            .inuse
            .prev(offset)
            .map_or(0, |(prev, size)| prev + size);
        let right = self
            .inuse
            .next(offset)
            .map_or(self.total_size, |(next, _)| next);

        (left, right)
    }

    fn mark_inuse(&mut self, offset: u32, size: u32) {
        if let Some(old) = self.inuse.insert(offset, size) {
            consistency_violation!("{} is already allocated (size {})", offset, old);
        }
    }

    // `offset` must be allocated with `size`
    fn free_run(&mut self, offset: u32, size: u32) {
        let (left, right) = self.free_bounds(offset);
        let end = offset + size;

        // unsplit the neighbors and split the merged gap again
        self.free.remove_run(left, offset - left);
        self.free.remove_run(end, right - end);
        self.free.insert_run(left, right - left);

        self.inuse.remove(offset);
    }

    fn post_check(&self) {
        #[cfg(feature = "check-invariants")]
        {
            if let Err(violation) = self.check() {
                panic!("power2 allocator: {}\n{:#?}", violation, self);
            }
        }
    }
}

/// Iterator over the live allocations of a [`Power2Allocator`]
///
/// [`Power2Allocator`]: struct.Power2Allocator.html
pub struct Allocations<'a> {
    inner: map::Iter<'a>,
}

impl Iterator for Allocations<'_> {
    /// `(offset, size)`
    type Item = (u32, u32);

    fn next(&mut self) -> Option<(u32, u32)> {
        self.inner.next()
    }
}

// only read through the derived formatters
#[allow(dead_code)]
#[cfg_attr(feature = "ufmt", derive(uDebug))]
#[derive(Clone, Copy, Debug)]
struct Piece {
    offset: u32,
    len: u32,
}

// Entries of one index structure
struct List<'a>(&'a SparseMap);

impl List<'_> {
    fn pieces(&self) -> impl Iterator<Item = Piece> + '_ {
        self.0.iter().map(|(offset, len)| Piece { offset, len })
    }
}

impl fmt::Debug for List<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.pieces()).finish()
    }
}

#[cfg(feature = "ufmt")]
impl ufmt::uDebug for List<'_> {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.debug_list()?.entries(self.pieces())?.finish()
    }
}

// Non-empty free lists, keyed by size class
struct FreeRuns<'a>(&'a FreeLists);

impl FreeRuns<'_> {
    fn lists(&self) -> impl Iterator<Item = (u32, List<'_>)> + '_ {
        (0..self.0.count())
            .map(move |class| (class, self.0.list(class)))
            .filter(|(_, list)| !list.is_empty())
            .map(|(class, list)| (class, List(list)))
    }
}

impl fmt::Debug for FreeRuns<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (class, list) in self.lists() {
            map.entry(&class, &list);
        }
        map.finish()
    }
}

#[cfg(feature = "ufmt")]
impl ufmt::uDebug for FreeRuns<'_> {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        let mut map = f.debug_map()?;
        for (class, list) in self.lists() {
            map.entry(&class, &list)?;
        }
        map.finish()
    }
}

impl fmt::Debug for Power2Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Power2Allocator")
            .field("max_size", &self.max_size)
            .field("total_size", &self.total_size)
            .field("free", &FreeRuns(&self.free))
            .field("used", &List(&self.inuse))
            .finish()
    }
}

#[cfg(feature = "ufmt")]
impl ufmt::uDebug for Power2Allocator {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.debug_struct("Power2Allocator")?
            .field("max_size", &self.max_size)?
            .field("total_size", &self.total_size)?
            .field("free", &FreeRuns(&self.free))?
            .field("used", &List(&self.inuse))?
            .finish()
    }
}
