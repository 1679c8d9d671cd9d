//! The ring's control block: head/tail cursors, stats counters, and (for
//! multi-reader rings) the attach bitmap.

use std::sync::atomic::{AtomicU32, AtomicU64};

use zdb_util::padding::CachePadded;

use crate::flags::MAX_READERS;

/// Shared state for one ring. One writer, up to [`MAX_READERS`] readers.
///
/// The head and tail cursors are each on their own cache line: the writer
/// spins/CASes on `reserve`, readers spin on `head` (to detect new data)
/// but only the space-reclaiming side touches `tail`, so separating them
/// avoids a writer and a reader bouncing the same line on every operation.
pub struct ControlBlock {
    /// Packed `offset | Wrapped`. The publicly visible frontier: readers
    /// only ever see a record once `push2` has stored its value here, after
    /// the writer has finished filling in the payload.
    pub head: CachePadded<AtomicU32>,
    /// Packed `offset | Wrapped | Locked`. The reservation frontier: writers
    /// CAS this forward to claim space ahead of actually publishing it, so
    /// two reservations never alias, even though the matching `head` store
    /// (in `push2`) may lag behind by however long the write takes.
    pub reserve: CachePadded<AtomicU32>,
    /// Packed `offset | EndOfFile | Waiting`. Advanced as space is
    /// reclaimed; carries the ring-level EOF/Waiting flags.
    pub tail: CachePadded<AtomicU32>,

    /// Records pushed, total.
    pub in_count: CachePadded<AtomicU64>,
    /// Payload bytes pushed, total (excludes header/padding).
    pub in_bytes: AtomicU64,
    /// Records fully consumed (by every reader, for MR), total.
    pub out_count: AtomicU64,
    /// Payload bytes consumed, total.
    pub out_bytes: AtomicU64,

    /// Bitmap of currently attached reader ids (multi-reader only; unused
    /// and always zero for single-reader rings).
    pub attached: CachePadded<AtomicU64>,
    /// Incremented on every `attach()`/`detach()`; lets a reader distinguish
    /// "nobody has attached yet" generations from "everyone detached".
    pub attach_generation: AtomicU64,
}

impl ControlBlock {
    /// A freshly opened ring: both cursors at offset zero, unwrapped,
    /// unlocked, not at EOF, nobody attached.
    pub fn new() -> ControlBlock {
        ControlBlock {
            head: CachePadded::new(AtomicU32::new(0)),
            reserve: CachePadded::new(AtomicU32::new(0)),
            tail: CachePadded::new(AtomicU32::new(0)),
            in_count: CachePadded::new(AtomicU64::new(0)),
            in_bytes: AtomicU64::new(0),
            out_count: AtomicU64::new(0),
            out_bytes: AtomicU64::new(0),
            attached: CachePadded::new(AtomicU64::new(0)),
            attach_generation: AtomicU64::new(0),
        }
    }

    /// Number of readers currently attached (multi-reader rings only).
    pub fn reader_count(&self, ordering: std::sync::atomic::Ordering) -> u32 {
        self.attached.load(ordering).count_ones()
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        ControlBlock::new()
    }
}

const _: () = assert!(MAX_READERS == 62, "attached bitmap assumes 62 usable reader bits");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn fresh_control_block_is_empty_and_unattached() {
        let control = ControlBlock::new();
        assert_eq!(control.head.load(Ordering::Relaxed), 0);
        assert_eq!(control.tail.load(Ordering::Relaxed), 0);
        assert_eq!(control.reader_count(Ordering::Relaxed), 0);
    }
}
