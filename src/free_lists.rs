use alloc::vec::Vec;
use core::{cmp, convert::TryFrom};

use log::trace;

use crate::{consts, map::SparseMap, util};

/// One piece of a free run as stored in a free list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub class: u32,
    pub offset: u32,
    pub len: u32,
}

/// Splits the run `offset..offset + len` into the pieces stored in the free lists
///
/// Each step carves the largest piece that `offset` is aligned to and that the remaining length
/// can fill, capped at the top size class. The sequence only depends on `(offset, len)`, which is
/// what lets `remove_run` undo any run that `insert_run` stored without remembering how it was
/// split.
pub struct Chunks {
    cur: u32,
    rem: u32,
    top: u32,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.rem == 0 {
            return None;
        }

        // NOTE `ctz(0)` is 32 so offset zero never limits the class
        let class = cmp::min(
            cmp::min(util::ctz(self.cur), util::ceil_log2(self.rem)),
            self.top,
        );
        let full = 1u32 << class;
        let len = if self.rem < full {
            // only the last piece of a run can fall short of its class size
            debug_assert!(self.rem > full >> 1);
            self.rem
        } else {
            full
        };

        debug_assert_eq!(self.cur % full, 0);

        let chunk = Chunk {
            class,
            offset: self.cur,
            len,
        };
        self.cur += len;
        self.rem -= len;

        Some(chunk)
    }
}

/// The free lists, one per size class
///
/// Class `c` holds pieces with lengths in `(2^(c-1), 2^c]` whose offsets have at least `c`
/// trailing zeros
#[derive(Clone, PartialEq, Eq)]
pub struct FreeLists {
    lists: Vec<SparseMap>,
}

impl FreeLists {
    /* Constructors */
    pub fn new(count: u32) -> Self {
        debug_assert!(count >= 1 && count <= consts::MAX_FREE_LISTS);

        FreeLists {
            lists: (0..count).map(|_| SparseMap::new()).collect(),
        }
    }

    /* Getters */
    pub fn count(&self) -> u32 {
        self.lists.len() as u32
    }

    pub fn top(&self) -> u32 {
        self.count() - 1
    }

    pub fn list(&self, class: u32) -> &SparseMap {
        &self.lists[class as usize]
    }

    /// Total number of free pieces
    pub fn len(&self) -> usize {
        self.lists.iter().map(SparseMap::len).sum()
    }

    /// `(class, offset, len)` of every free piece, class-major
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.lists.iter().zip(0..).flat_map(|(list, class)| {
            list.iter()
                .map(move |(offset, len)| (class, offset, len))
        })
    }

    pub fn chunks(&self, offset: u32, len: u32) -> Chunks {
        Chunks {
            cur: offset,
            rem: len,
            top: self.top(),
        }
    }

    /* Split / merge */
    /// Stores the free run `offset..offset + len`
    pub fn insert_run(&mut self, offset: u32, len: u32) {
        for chunk in self.chunks(offset, len) {
            trace!(
                "free list {}: insert {}+{}",
                chunk.class,
                chunk.offset,
                chunk.len
            );

            if let Some(old) = self.lists[chunk.class as usize].insert(chunk.offset, chunk.len) {
                consistency_violation!(
                    "free list {} already holds a piece at {} (len {})",
                    chunk.class,
                    chunk.offset,
                    old
                );
            }
        }
    }

    /// Drops the free run `offset..offset + len`, which must have been stored by `insert_run`
    /// (possibly as part of a larger run that it is a prefix or suffix of)
    pub fn remove_run(&mut self, offset: u32, len: u32) {
        for chunk in self.chunks(offset, len) {
            trace!(
                "free list {}: remove {}+{}",
                chunk.class,
                chunk.offset,
                chunk.len
            );

            match self.lists[chunk.class as usize].remove(chunk.offset) {
                Some(stored) if stored == chunk.len => {}
                Some(stored) => consistency_violation!(
                    "free list {} piece at {} has len {}, expected {}",
                    chunk.class,
                    chunk.offset,
                    stored,
                    chunk.len
                ),
                None => consistency_violation!(
                    "free list {} has no piece at {}",
                    chunk.class,
                    chunk.offset
                ),
            }
        }
    }

    /* Searches */
    /// Removes and returns the lowest piece of `class` that can hold `size` indices
    pub fn take_first_fit(&mut self, class: u32, size: u32) -> Option<(u32, u32)> {
        let list = &mut self.lists[class as usize];
        let (offset, len) = list.iter().find(|&(_, len)| len >= size)?;
        list.remove(offset);

        Some((offset, len))
    }

    pub fn take(&mut self, class: u32, offset: u32) -> Option<u32> {
        self.lists[class as usize].remove(offset)
    }

    /// Finds the lowest top class piece at a multiple of `align` that starts `count` pieces,
    /// spaced one top class size apart, each able to hold `size` indices
    pub fn find_top_class_runs(&self, size: u32, count: u32, align: u64) -> Option<u32> {
        let list = self.list(self.top());
        let stride = 1u64 << self.top();

        list.iter()
            .map(|(offset, _)| offset)
            .filter(|&offset| u64::from(offset) % align == 0)
            .find(|&offset| {
                (0..u64::from(count)).all(|i| {
                    u32::try_from(u64::from(offset) + i * stride)
                        .ok()
                        .and_then(|at| list.get(at))
                        .map_or(false, |len| len >= size)
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{Chunk, FreeLists};

    fn chunks(lists: &FreeLists, offset: u32, len: u32) -> Vec<(u32, u32, u32)> {
        lists
            .chunks(offset, len)
            .map(|Chunk { class, offset, len }| (class, offset, len))
            .collect()
    }

    #[test]
    fn split_by_alignment() {
        // classes 0..=10
        let lists = FreeLists::new(11);

        // 1010 has one trailing zero, 1012 two, 1016 three
        assert_eq!(
            chunks(&lists, 1010, 10),
            [(1, 1010, 2), (2, 1012, 4), (2, 1016, 4)]
        );

        // a short tail keeps the class it rounds up to
        assert_eq!(chunks(&lists, 0, 1023), [(10, 0, 1023)]);
        assert_eq!(chunks(&lists, 326, 58)[0], (1, 326, 2));
    }

    #[test]
    fn split_capped_at_top_class() {
        // classes 0..=7
        let lists = FreeLists::new(8);

        assert_eq!(
            chunks(&lists, 0, 384),
            [(7, 0, 128), (7, 128, 128), (7, 256, 128)]
        );
        assert_eq!(chunks(&lists, 255, 1), [(0, 255, 1)]);
        assert!(chunks(&lists, 64, 0).is_empty());
    }

    #[test]
    fn remove_prefix_of_inserted_run() {
        let mut lists = FreeLists::new(11);

        lists.insert_run(0, 960);
        lists.remove_run(0, 960);
        assert_eq!(lists.len(), 0);

        lists.insert_run(1010, 14);
        lists.remove_run(1010, 14);
        assert_eq!(lists.len(), 0);
    }

    #[test]
    fn first_fit_skips_small_pieces() {
        let mut lists = FreeLists::new(8);
        lists.insert_run(0, 127);
        lists.insert_run(128, 128);

        assert_eq!(lists.take_first_fit(7, 128), Some((128, 128)));
        assert_eq!(lists.take_first_fit(7, 128), None);
        assert_eq!(lists.take_first_fit(7, 127), Some((0, 127)));
        assert_eq!(lists.len(), 0);
    }

    #[test]
    fn top_class_runs_respect_alignment() {
        let mut lists = FreeLists::new(8);
        lists.insert_run(128, 128 * 5);

        // 128 is not a multiple of 256
        assert_eq!(lists.find_top_class_runs(100, 2, 256), Some(256));
        assert_eq!(lists.find_top_class_runs(100, 3, 512), None);
        assert_eq!(lists.find_top_class_runs(100, 1, 128), Some(128));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn remove_missing_run() {
        let mut lists = FreeLists::new(4);
        lists.insert_run(0, 8);
        lists.remove_run(8, 8);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn insert_twice() {
        let mut lists = FreeLists::new(4);
        lists.insert_run(0, 8);
        lists.insert_run(0, 8);
    }
}
