//! A non-overlapping interval tree over half-open ranges `[start, end)`
//! that automatically merges overlapping and adjacent intervals on insert,
//! so that repeated insertion of nearby ranges never fragments into more
//! pieces than the data actually requires.
//!
//! Backed by a [`BTreeMap`] keyed on interval start: a disjoint set of
//! intervals has exactly one entry whose start is `<=` any point of
//! interest, so point/overlap queries are `O(log n)` via
//! [`BTreeMap::range`].
#![deny(missing_docs)]

use std::collections::BTreeMap;
use std::ops::Range;

/// A set of disjoint `[start, end)` intervals over `K`, merging overlapping
/// and touching intervals together on every insert.
///
/// `K` only needs `Ord + Copy`; there is no requirement that it be an
/// integer type, so this works equally well over sequence numbers, byte
/// offsets, or any other totally ordered key space.
#[derive(Debug, Clone)]
pub struct IntervalTree<K> {
    // Keyed by interval start; value is the interval's (exclusive) end.
    by_start: BTreeMap<K, K>,
}

impl<K: Ord + Copy> Default for IntervalTree<K> {
    fn default() -> Self {
        IntervalTree { by_start: BTreeMap::new() }
    }
}

impl<K: Ord + Copy> IntervalTree<K> {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of disjoint intervals currently stored.
    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    /// True if no intervals are stored.
    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    /// Remove every interval.
    pub fn clear(&mut self) {
        self.by_start.clear();
    }

    /// Insert `[range.start, range.end)`, merging it with any interval it
    /// overlaps or touches. A zero-length range (`start >= end`) is a no-op.
    ///
    /// Returns the (possibly larger, merged) interval that now covers
    /// `range`.
    pub fn insert(&mut self, range: Range<K>) -> Range<K> {
        if range.start >= range.end {
            return self.covering_or(range);
        }

        let mut start = range.start;
        let mut end = range.end;

        // Absorb the predecessor if it overlaps or touches `start`.
        if let Some((&p_start, &p_end)) = self.by_start.range(..=start).next_back() {
            if p_end >= start {
                start = p_start;
                end = end.max(p_end);
            }
        }

        // Absorb every interval whose start falls within `[start, end]`
        // (`end` inclusive: an interval starting exactly at `end` touches
        // this one and must merge too, per "adjacent intervals merge").
        let absorbed: Vec<K> = self
            .by_start
            .range(start..=end)
            .map(|(&s, _)| s)
            .collect();
        for s in absorbed {
            if let Some(e) = self.by_start.remove(&s) {
                end = end.max(e);
            }
        }

        self.by_start.insert(start, end);
        start..end
    }

    /// Remove `[range.start, range.end)` from the tree, splitting or
    /// shrinking any interval it overlaps. A zero-length range is a no-op.
    pub fn remove(&mut self, range: Range<K>) {
        if range.start >= range.end {
            return;
        }

        let overlapping: Vec<(K, K)> = self
            .by_start
            .range(..range.end)
            .filter(|(_, &end)| end > range.start)
            .map(|(&s, &e)| (s, e))
            .collect();

        for (s, e) in overlapping {
            self.by_start.remove(&s);
            if s < range.start {
                self.by_start.insert(s, range.start);
            }
            if e > range.end {
                self.by_start.insert(range.end, e);
            }
        }
    }

    /// True if `point` falls within some stored interval.
    pub fn contains(&self, point: K) -> bool {
        self.interval_containing(point).is_some()
    }

    /// The stored interval containing `point`, if any.
    pub fn interval_containing(&self, point: K) -> Option<Range<K>> {
        self.by_start
            .range(..=point)
            .next_back()
            .filter(|&(_, &end)| end > point)
            .map(|(&s, &e)| s..e)
    }

    /// True if every point in `range` is covered by some stored interval
    /// (ranges may span more than one stored interval only if they are
    /// contiguous, since overlapping/touching ones are always merged).
    pub fn covers(&self, range: Range<K>) -> bool {
        if range.start >= range.end {
            return true;
        }
        self.interval_containing(range.start).map(|iv| iv.end >= range.end).unwrap_or(false)
    }

    /// Iterate stored intervals in ascending order of `start`.
    pub fn iter(&self) -> impl Iterator<Item = Range<K>> + '_ {
        self.by_start.iter().map(|(&s, &e)| s..e)
    }

    /// Iterate every stored interval overlapping `range`.
    pub fn overlapping(&self, range: Range<K>) -> impl Iterator<Item = Range<K>> + '_ {
        self.by_start
            .range(..range.end)
            .filter(move |(_, &end)| end > range.start)
            .map(|(&s, &e)| s..e)
    }

    fn covering_or(&self, range: Range<K>) -> Range<K> {
        self.interval_containing(range.start).unwrap_or(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn disjoint_inserts_stay_disjoint() {
        let mut tree = IntervalTree::new();
        tree.insert(0..5);
        tree.insert(10..15);
        assert_eq!(tree.len(), 2);
        assert!(tree.contains(2));
        assert!(!tree.contains(7));
        assert!(tree.contains(12));
    }

    #[test]
    fn overlapping_insert_merges() {
        let mut tree = IntervalTree::new();
        tree.insert(0..5);
        tree.insert(3..8);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.interval_containing(4), Some(0..8));
    }

    #[test]
    fn touching_insert_merges_without_gap() {
        let mut tree = IntervalTree::new();
        tree.insert(0..5);
        tree.insert(5..10);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.interval_containing(0), Some(0..10));
    }

    #[test]
    fn insert_bridges_two_existing_intervals() {
        let mut tree = IntervalTree::new();
        tree.insert(0..5);
        tree.insert(10..15);
        tree.insert(4..11);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.interval_containing(0), Some(0..15));
    }

    #[test]
    fn remove_splits_an_interval() {
        let mut tree = IntervalTree::new();
        tree.insert(0..10);
        tree.remove(4..6);
        assert_eq!(tree.len(), 2);
        assert!(tree.contains(2));
        assert!(!tree.contains(4));
        assert!(!tree.contains(5));
        assert!(tree.contains(6));
    }

    #[test]
    fn remove_shrinks_from_either_edge() {
        let mut tree = IntervalTree::new();
        tree.insert(0..10);
        tree.remove(0..3);
        assert_eq!(tree.interval_containing(5), Some(3..10));
        tree.remove(8..10);
        assert_eq!(tree.interval_containing(5), Some(3..8));
    }

    #[test]
    fn covers_reports_partial_coverage_as_false() {
        let mut tree = IntervalTree::new();
        tree.insert(0..5);
        assert!(tree.covers(1..4));
        assert!(!tree.covers(1..10));
    }

    proptest! {
        #[test]
        fn never_overlaps_after_arbitrary_inserts(
            ranges in prop::collection::vec((0i64..100, 0i64..20), 0..30)
        ) {
            let mut tree = IntervalTree::new();
            for (start, len) in ranges {
                tree.insert(start..start + len);
            }
            let stored: Vec<_> = tree.iter().collect();
            for w in stored.windows(2) {
                prop_assert!(w[0].end < w[1].start, "adjacent/overlapping intervals should have merged: {:?}, {:?}", w[0], w[1]);
            }
        }

        #[test]
        fn union_of_points_is_preserved(
            ranges in prop::collection::vec((0i64..50, 1i64..10), 1..20)
        ) {
            let mut tree = IntervalTree::new();
            let mut expected = std::collections::BTreeSet::new();
            for (start, len) in &ranges {
                tree.insert(*start..*start + *len);
                for p in *start..*start + *len {
                    expected.insert(p);
                }
            }
            for p in expected {
                prop_assert!(tree.contains(p));
            }
        }
    }
}
