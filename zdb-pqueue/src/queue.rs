//! The ordered-by-sequence item container (§3.2 Queue, §4.2 algorithm).

use crossbeam_skiplist::SkipMap;
use merging_interval_tree::IntervalTree;

use crate::item::PqItem;

/// Running in/out counters the queue exposes for telemetry, mirroring the
/// source's per-queue stats fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Total sequence-number length ever enqueued.
    pub in_count: u64,
    /// Total payload bytes ever enqueued.
    pub in_bytes: u64,
    /// Total sequence-number length ever dequeued.
    pub out_count: u64,
    /// Total payload bytes ever dequeued.
    pub out_bytes: u64,
}

/// Outcome of [`Queue::enqueue`].
#[derive(Debug)]
pub enum Enqueued<I> {
    /// The item (or what remained of it after clipping) was stored.
    Stored,
    /// The item was entirely behind `head_key` and therefore dropped
    /// without being stored.
    Dropped,
    /// `rotate` was requested and the item landed exactly at `head_key`:
    /// it is handed back directly, per §4.2 step 3, and was never stored.
    Rotated(I),
}

/// An ordered, non-overlapping, gap-tolerant container of items (§3.2 `Q`).
///
/// Storage is a [`SkipMap`] keyed by sequence number for `O(log n)`
/// bidirectional search (the Rust stand-in for the source's deterministic
/// per-level skip list, §2 ADD). A parallel [`IntervalTree`] tracks which
/// sequence ranges have actually been *received* (as opposed to merely
/// `head_key`-advanced past), which makes `gap()` an `O(log n)` lookup
/// instead of a walk of the skip map.
pub struct Queue<I> {
    items: SkipMap<u64, I>,
    received: IntervalTree<u64>,
    head_key: u64,
    tail_key: u64,
    length: u64,
    /// Monotonically increasing insertion serial (§3.2); retained for
    /// parity with the source's deterministic-placement field even though
    /// `SkipMap`'s own leveling no longer consults it directly.
    serial: u64,
    stats: QueueStats,
}

impl<I: PqItem> Queue<I> {
    /// Construct an empty queue with the given initial `head_key`.
    pub fn new(head_key: u64) -> Queue<I> {
        Queue {
            items: SkipMap::new(),
            received: IntervalTree::new(),
            head_key,
            tail_key: head_key,
            length: 0,
            serial: 0,
            stats: QueueStats::default(),
        }
    }

    /// Current head key: items with `key() < head_key` have all already
    /// been consumed or dropped.
    pub fn head_key(&self) -> u64 {
        self.head_key
    }

    /// Current tail key: the sequence number one past the furthest byte
    /// ever enqueued.
    pub fn tail_key(&self) -> u64 {
        self.tail_key
    }

    /// Sum of stored items' lengths.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Number of stored items.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Running in/out counters.
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Discard every stored item and reposition head/tail to `key`.
    pub fn reset(&mut self, key: u64) {
        self.items.clear();
        self.received.clear();
        self.head_key = key;
        self.tail_key = key;
        self.length = 0;
    }

    /// Advance (or, if `key < head_key`, rewind — treated as a [`reset`]) the
    /// head. Advancing clips or drops every item now behind `head_key`.
    pub fn head(&mut self, key: u64) {
        if key < self.head_key {
            self.reset(key);
            return;
        }
        self.head_key = key;

        let stale: Vec<u64> = self.items.range(..key).map(|e| *e.key()).collect();
        for k in stale {
            if let Some(entry) = self.items.get(&k) {
                let mut item = entry.value().clone();
                let end = k + item.len();
                entry.remove();
                if end > key {
                    let clipped = key - k;
                    self.length -= clipped;
                    item.clip_head(clipped);
                    self.items.insert(key, item);
                } else {
                    self.length -= item.len();
                }
            }
        }
        self.received.remove(0..key);
    }

    /// §4.2 enqueue algorithm. `rotate` enables the single-dequeue fast
    /// path (step 3): when the new item lands exactly at `head_key`, it is
    /// handed back directly without ever touching the skip map.
    pub fn enqueue(&mut self, mut item: I, rotate: bool) -> Enqueued<I> {
        if item.is_empty() {
            return Enqueued::Dropped;
        }

        let k = item.key();
        let l = item.len();

        // Step 1: entirely behind head, drop.
        if k + l <= self.head_key {
            return Enqueued::Dropped;
        }

        // Step 2: partially behind head, clip the prefix off.
        if k < self.head_key {
            let clipped = self.head_key - k;
            item.clip_head(clipped);
            item.set_key(self.head_key);
        }

        let k = item.key();
        let l = item.len();
        if l == 0 {
            return Enqueued::Dropped;
        }

        // Step 3: fast path, never stored.
        if k == self.head_key && rotate {
            self.head_key += l;
            self.stats.in_count += l;
            self.stats.in_bytes += item.bytes();
            self.stats.out_count += l;
            self.stats.out_bytes += item.bytes();
            return Enqueued::Rotated(item);
        }

        let end = k + l;

        // Step 4: successor that starts exactly at `k` and already spans
        // the new item fully is overwritten in place.
        if let Some(entry) = self.items.range(k..).next() {
            let succ_key = *entry.key();
            let succ_len = entry.value().len();
            if succ_key == k && succ_key + succ_len >= end {
                let mut updated = entry.value().clone();
                updated.write(&item);
                entry.remove();
                self.items.insert(succ_key, updated);
                self.record_receipt(k, end);
                return Enqueued::Stored;
            }
        }

        // Predecessor: fully spans the new item (overwrite) or partially
        // overlaps it (clip the predecessor's tail).
        if let Some(entry) = self.items.range(..k).next_back() {
            let pred_key = *entry.key();
            let pred_len = entry.value().len();
            let pred_end = pred_key + pred_len;
            if pred_end >= end {
                let mut updated = entry.value().clone();
                updated.write(&item);
                entry.remove();
                self.items.insert(pred_key, updated);
                self.record_receipt(k, end);
                return Enqueued::Stored;
            } else if pred_end > k {
                let mut updated = entry.value().clone();
                let overlap = pred_end - k;
                entry.remove();
                let new_len = updated.clip_tail(overlap);
                self.length -= pred_len - new_len;
                if new_len > 0 {
                    self.items.insert(pred_key, updated);
                }
            }
        }

        // Remove every fully overlapped successor; clip_head a partially
        // overlapping one.
        let overlapping: Vec<(u64, u64)> =
            self.items.range(k..end).map(|e| (*e.key(), e.value().len())).collect();
        for (sk, slen) in overlapping {
            if let Some(entry) = self.items.get(&sk) {
                let mut succ = entry.value().clone();
                entry.remove();
                if sk + slen <= end {
                    self.length -= slen;
                } else {
                    let overlap = end - sk;
                    let new_len = succ.clip_head(overlap);
                    self.length -= slen - new_len;
                    self.items.insert(end, succ);
                }
            }
        }

        self.length += l;
        self.serial += 1;
        self.stats.in_count += l;
        self.stats.in_bytes += item.bytes();
        self.items.insert(k, item);
        self.tail_key = self.tail_key.max(end);
        self.record_receipt(k, end);
        Enqueued::Stored
    }

    fn record_receipt(&mut self, start: u64, end: u64) {
        self.received.insert(start..end);
    }

    /// Return the head item only if it starts exactly at `head_key`,
    /// advancing `head_key` past it. Unlike [`shift`](Queue::shift), a
    /// gap at the head yields `None` rather than skipping it.
    pub fn dequeue(&mut self) -> Option<I> {
        loop {
            let entry = self.items.front()?;
            if *entry.key() != self.head_key {
                return None;
            }
            let item = entry.value().clone();
            if item.is_empty() {
                entry.remove();
                continue;
            }
            entry.remove();
            self.length -= item.len();
            self.head_key += item.len();
            self.stats.out_count += item.len();
            self.stats.out_bytes += item.bytes();
            return Some(item);
        }
    }

    /// Return and remove the head item regardless of whether it starts at
    /// `head_key` (bypasses the gap check), advancing `head_key` to just
    /// past it.
    pub fn shift(&mut self) -> Option<I> {
        loop {
            let entry = self.items.pop_front()?;
            let item = entry.value().clone();
            if item.is_empty() {
                continue;
            }
            self.length -= item.len();
            self.head_key = item.key() + item.len();
            self.stats.out_count += item.len();
            self.stats.out_bytes += item.bytes();
            return Some(item);
        }
    }

    /// Peek the head item without removing it.
    pub fn peek(&self) -> Option<I> {
        self.items.front().map(|e| e.value().clone())
    }

    /// First missing interval starting at or after `head_key`, if any:
    /// `None` means everything from `head_key` up to `tail_key` has been
    /// received.
    pub fn gap(&self) -> Option<(u64, u64)> {
        if self.head_key >= self.tail_key {
            return None;
        }
        match self.received.interval_containing(self.head_key) {
            Some(covered) if covered.end >= self.tail_key => None,
            Some(covered) => Some((covered.end, self.tail_key - covered.end)),
            None => {
                // head_key itself is missing; the gap runs until whatever
                // was received next (or the whole way to tail_key).
                let next_received_start = self
                    .received
                    .overlapping(self.head_key..self.tail_key)
                    .next()
                    .map(|iv| iv.start)
                    .unwrap_or(self.tail_key);
                Some((self.head_key, next_received_start - self.head_key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ByteItem;
    use proptest::prelude::*;

    #[test]
    fn s3_rotate_fast_path() {
        let mut queue: Queue<ByteItem> = Queue::new(100);
        let item = ByteItem::new(100, vec![0u8; 5]);
        match queue.enqueue(item, true) {
            Enqueued::Rotated(i) => assert_eq!(i.key(), 100),
            other => panic!("expected Rotated, got {other:?}"),
        }
        assert_eq!(queue.head_key(), 105);
        assert_eq!(queue.count(), 0);
    }

    #[test]
    fn s4_gap_then_fill() {
        let mut queue: Queue<ByteItem> = Queue::new(0);
        queue.enqueue(ByteItem::new(10, vec![0u8; 5]), false);
        assert_eq!(queue.gap(), Some((0, 10)));
        queue.head(10);
        assert_eq!(queue.dequeue().map(|i| i.key()), Some(10));
    }

    #[test]
    fn overlapping_enqueue_overwrites_predecessor() {
        let mut queue: Queue<ByteItem> = Queue::new(0);
        queue.enqueue(ByteItem::new(0, b"aaaaa".to_vec()), false);
        queue.enqueue(ByteItem::new(2, b"XX".to_vec()), false);
        assert_eq!(queue.count(), 1);
        let item = queue.dequeue().unwrap();
        assert_eq!(item.payload(), b"aaXXa");
    }

    #[test]
    fn fully_overlapped_successor_is_dropped() {
        let mut queue: Queue<ByteItem> = Queue::new(0);
        queue.enqueue(ByteItem::new(5, b"bb".to_vec()), false);
        queue.enqueue(ByteItem::new(0, b"aaaaaaaa".to_vec()), false);
        assert_eq!(queue.count(), 1);
    }

    #[test]
    fn behind_head_is_dropped() {
        let mut queue: Queue<ByteItem> = Queue::new(20);
        match queue.enqueue(ByteItem::new(0, vec![0u8; 5]), false) {
            Enqueued::Dropped => {}
            other => panic!("expected Dropped, got {other:?}"),
        }
    }

    #[test]
    fn partially_behind_head_is_clipped() {
        let mut queue: Queue<ByteItem> = Queue::new(3);
        queue.enqueue(ByteItem::new(0, b"abcde".to_vec()), false);
        let item = queue.dequeue().unwrap();
        assert_eq!(item.key(), 3);
        assert_eq!(item.payload(), b"de");
    }

    #[test]
    fn round_trip_arbitrary_order_yields_key_order() {
        let mut queue: Queue<ByteItem> = Queue::new(0);
        let inputs = [(10u64, b"bb".to_vec()), (0, b"aa".to_vec()), (20, b"cc".to_vec())];
        for (k, payload) in inputs {
            queue.enqueue(ByteItem::new(k, payload), false);
        }
        let mut out = Vec::new();
        while let Some(item) = queue.peek() {
            if item.key() != queue.head_key() {
                break;
            }
            out.push(queue.dequeue().unwrap());
        }
        assert_eq!(out.iter().map(|i| i.key()).collect::<Vec<_>>(), vec![0, 10, 20]);
    }

    proptest! {
        // Property 3: after any sequence of enqueues (in arbitrary order,
        // with arbitrary overlap), no two stored items overlap.
        #[test]
        fn no_overlap_invariant_holds_after_arbitrary_enqueues(
            ops in prop::collection::vec((0u64..200, 1u64..20), 1..40)
        ) {
            let mut queue: Queue<ByteItem> = Queue::new(0);
            for (key, len) in ops {
                queue.enqueue(ByteItem::new(key, vec![0u8; len as usize]), false);
            }

            let items: Vec<(u64, u64)> = queue.items.iter().map(|e| (*e.key(), e.value().len())).collect();
            for w in items.windows(2) {
                let (k1, l1) = w[0];
                let (k2, _l2) = w[1];
                prop_assert!(k1 + l1 <= k2, "items [{k1},{}) and starting at {k2} overlap", k1 + l1);
            }
        }

        // Property 4: dequeuing non-overlapping items enqueued in arbitrary
        // order yields exactly those items, in key order.
        #[test]
        fn round_trip_holds_for_arbitrary_non_overlapping_permutations(
            seed in prop::collection::vec(1u64..20, 1..15)
        ) {
            // Build a set of non-overlapping spans by laying them out back
            // to back, then enqueue them in a shuffled order.
            let mut key = 0u64;
            let mut spans = Vec::new();
            for len in &seed {
                spans.push((key, *len));
                key += *len;
            }
            let mut shuffled = spans.clone();
            // A cheap deterministic "shuffle": reverse every other pair.
            for chunk in shuffled.chunks_mut(2) {
                chunk.reverse();
            }

            let mut queue: Queue<ByteItem> = Queue::new(0);
            for (k, len) in &shuffled {
                queue.enqueue(ByteItem::new(*k, vec![*k as u8; *len as usize]), false);
            }

            let mut out = Vec::new();
            while let Some(item) = queue.dequeue() {
                out.push(item.key());
            }
            let expected: Vec<u64> = spans.iter().map(|(k, _)| *k).collect();
            prop_assert_eq!(out, expected);
        }
    }
}
