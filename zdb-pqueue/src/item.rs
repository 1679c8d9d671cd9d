//! The per-entry contract the queue operates on (§3.2 Item).
//!
//! An item occupies `[key(), key() + len())` in sequence space. The queue
//! never interprets the payload; it only ever calls `clip_head`/`clip_tail`
//! to shrink an item from either end and `write` to splice a newer item's
//! data over an overlapping span.

/// An entry orderable by sequence number, clippable from either end.
///
/// Implementations are expected to be cheap to clone: the queue clones an
/// item whenever it needs to produce a shrunk copy rather than mutate one
/// still reachable from elsewhere (the skip map yields shared references).
pub trait PqItem: Clone + Send + Sync + 'static {
    /// Start of this item's span in sequence space.
    fn key(&self) -> u64;

    /// Reassign this item's start, without touching its length or payload.
    /// Used after `clip_head` has already removed the clipped prefix from
    /// the payload.
    fn set_key(&mut self, key: u64);

    /// Length of this item's span (`L` in §3.2; `0` is valid and always
    /// skipped by enqueue/dequeue).
    fn len(&self) -> u64;

    /// True if this item spans zero sequence numbers.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the first `n` sequence numbers from this item (`n <= len()`),
    /// advancing `key()` by `n`. Returns the new length.
    fn clip_head(&mut self, n: u64) -> u64;

    /// Drop the last `n` sequence numbers from this item (`n <= len()`),
    /// leaving `key()` unchanged. Returns the new length.
    fn clip_tail(&mut self, n: u64) -> u64;

    /// Splice `other`'s payload over the sequence range `other` occupies
    /// that overlaps `self`, as if `other` had been written directly on
    /// top. `other` is not assumed to have the same span as `self`.
    fn write(&mut self, other: &Self);

    /// Payload size in bytes, for the queue's in/out byte accounting.
    /// Need not equal `len()` (sequence-number length and wire-byte size
    /// are independent axes — a sequence number can cover a variable-size
    /// record).
    fn bytes(&self) -> u64;
}

/// A concrete, byte-payload-backed item: `len()` is the payload length in
/// sequence-number units (one sequence number per byte, the common case for
/// a byte-stream reassembly queue), so `bytes() == len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteItem {
    key: u64,
    payload: Vec<u8>,
}

impl ByteItem {
    /// Construct an item starting at `key` carrying `payload`.
    pub fn new(key: u64, payload: Vec<u8>) -> ByteItem {
        ByteItem { key, payload }
    }

    /// Borrow the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl PqItem for ByteItem {
    fn key(&self) -> u64 {
        self.key
    }

    fn set_key(&mut self, key: u64) {
        self.key = key;
    }

    fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    fn clip_head(&mut self, n: u64) -> u64 {
        let n = n.min(self.payload.len() as u64) as usize;
        self.payload.drain(..n);
        self.key += n as u64;
        self.payload.len() as u64
    }

    fn clip_tail(&mut self, n: u64) -> u64 {
        let n = n.min(self.payload.len() as u64) as usize;
        let new_len = self.payload.len() - n;
        self.payload.truncate(new_len);
        new_len as u64
    }

    fn write(&mut self, other: &Self) {
        // Splice `other`'s bytes into the sub-range of `self.payload` that
        // `other`'s span overlaps, per §4.2 "overwrite it in place".
        let self_end = self.key + self.len();
        let other_end = other.key + other.len();
        let overlap_start = self.key.max(other.key);
        let overlap_end = self_end.min(other_end);
        if overlap_start >= overlap_end {
            return;
        }
        let dst_off = (overlap_start - self.key) as usize;
        let src_off = (overlap_start - other.key) as usize;
        let len = (overlap_end - overlap_start) as usize;
        self.payload[dst_off..dst_off + len].copy_from_slice(&other.payload[src_off..src_off + len]);
    }

    fn bytes(&self) -> u64 {
        self.payload.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_head_advances_key_and_shrinks() {
        let mut item = ByteItem::new(100, b"hello".to_vec());
        assert_eq!(item.clip_head(2), 3);
        assert_eq!(item.key(), 102);
        assert_eq!(item.payload(), b"llo");
    }

    #[test]
    fn clip_tail_keeps_key_and_shrinks() {
        let mut item = ByteItem::new(100, b"hello".to_vec());
        assert_eq!(item.clip_tail(2), 3);
        assert_eq!(item.key(), 100);
        assert_eq!(item.payload(), b"hel");
    }

    #[test]
    fn write_overwrites_only_the_overlapping_span() {
        let mut base = ByteItem::new(100, b"aaaaa".to_vec());
        let patch = ByteItem::new(102, b"XX".to_vec());
        base.write(&patch);
        assert_eq!(base.payload(), b"aaXXa");
    }
}
