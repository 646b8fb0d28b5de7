use alloc::collections::{btree_map, BTreeMap};
use core::ops::Bound;

/// Sparse ordered map from an index to a length
///
/// Every index structure of the allocator (each free list and the in-use list) is one of these.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SparseMap {
    entries: BTreeMap<u32, u32>,
}

impl SparseMap {
    /* Constructors */
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /* Setters */
    /// Returns the previous value if `index` was already present
    pub fn insert(&mut self, index: u32, value: u32) -> Option<u32> {
        self.entries.insert(index, value)
    }

    pub fn remove(&mut self, index: u32) -> Option<u32> {
        self.entries.remove(&index)
    }

    /* Getters */
    pub fn get(&self, index: u32) -> Option<u32> {
        self.entries.get(&index).copied()
    }

    pub fn contains(&self, index: u32) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn first(&self) -> Option<(u32, u32)> {
        self.entries.iter().next().map(|(&k, &v)| (k, v))
    }

    /// First entry strictly after `index`
    pub fn next(&self, index: u32) -> Option<(u32, u32)> {
        self.entries
            .range((Bound::Excluded(index), Bound::Unbounded))
            .next()
            .map(|(&k, &v)| (k, v))
    }

    /// Last entry strictly before `index`
    pub fn prev(&self, index: u32) -> Option<(u32, u32)> {
        self.entries
            .range(..index)
            .next_back()
            .map(|(&k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.range(..),
        }
    }
}

pub struct Iter<'a> {
    inner: btree_map::Range<'a, u32, u32>,
}

impl Iterator for Iter<'_> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<(u32, u32)> {
        self.inner.next().map(|(&k, &v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::SparseMap;

    #[test]
    fn neighbors() {
        let mut map = SparseMap::new();
        assert_eq!(map.first(), None);

        map.insert(8, 2);
        map.insert(2, 1);
        map.insert(16, 4);

        assert_eq!(map.first(), Some((2, 1)));
        assert_eq!(map.next(2), Some((8, 2)));
        assert_eq!(map.next(3), Some((8, 2)));
        assert_eq!(map.next(16), None);
        assert_eq!(map.prev(8), Some((2, 1)));
        assert_eq!(map.prev(9), Some((8, 2)));
        assert_eq!(map.prev(2), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn insert_reports_existing() {
        let mut map = SparseMap::new();

        assert_eq!(map.insert(4, 4), None);
        assert_eq!(map.insert(4, 3), Some(4));
        assert_eq!(map.remove(4), Some(3));
        assert_eq!(map.remove(4), None);
        assert!(map.is_empty());
    }

    #[test]
    fn iter_ascending() {
        let mut map = SparseMap::new();
        for i in (0..8).rev() {
            map.insert(i * 4, i);
        }

        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [0, 4, 8, 12, 16, 20, 24, 28]);
        assert_eq!(map.iter().nth(3), Some((12, 3)));
    }
}
