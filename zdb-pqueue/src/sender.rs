//! Sender mixin (§4.2): drives send/archive/resend passes, tracking
//! watermarks that only ever move forward on success and revert on
//! transient failure so the next `start()` resumes safely.

use crate::item::PqItem;
use crate::queue::Queue;

bitflags::bitflags! {
    /// State bits for the sender side (§4.2 `{Running, Sending, SendFailed,
    /// Archiving, Resending, ResendFailed}`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SenderFlags: u8 {
        /// The sender's driving task is alive.
        const RUNNING = 1 << 0;
        /// A send pass is in flight.
        const SENDING = 1 << 1;
        /// The most recent send pass hit a transient I/O failure.
        const SEND_FAILED = 1 << 2;
        /// An archive pass is in flight.
        const ARCHIVING = 1 << 3;
        /// A resend pass is in flight.
        const RESENDING = 1 << 4;
        /// The most recent resend pass hit a transient I/O failure.
        const RESEND_FAILED = 1 << 5;
    }
}

/// The outcome the caller's I/O layer reports back from one attempted send.
#[derive(Debug)]
pub enum SendAttempt {
    /// The item (or gap marker) went out successfully; the watermark may
    /// advance past it.
    Ok,
    /// A transient I/O failure occurred; the watermark must not move.
    Failed,
}

/// Sender-side watermarks and state, generic over the item type being
/// streamed out.
pub struct SenderState<I> {
    queue: Queue<I>,
    flags: SenderFlags,
    /// Next sequence number to send.
    send_key: u64,
    /// Highest sequence number acknowledged by the peer.
    ackd_key: u64,
    /// Sequence number up to which items have been moved to archive
    /// storage and may be shifted out of the live queue.
    archive_key: u64,
    /// Current resend gap being serviced, if any.
    resend_gap: Option<(u64, u64)>,
}

impl<I: PqItem> SenderState<I> {
    /// Construct sender state starting at `start_key` with nothing yet
    /// acknowledged or archived.
    pub fn new(start_key: u64) -> SenderState<I> {
        SenderState {
            queue: Queue::new(start_key),
            flags: SenderFlags::empty(),
            send_key: start_key,
            ackd_key: start_key,
            archive_key: start_key,
            resend_gap: None,
        }
    }

    /// The outbound live queue.
    pub fn queue(&self) -> &Queue<I> {
        &self.queue
    }

    /// Mutable access to the outbound live queue (e.g. to enqueue items
    /// produced locally for replication).
    pub fn queue_mut(&mut self) -> &mut Queue<I> {
        &mut self.queue
    }

    /// Current state bits.
    pub fn flags(&self) -> SenderFlags {
        self.flags
    }

    /// Next sequence number this sender will attempt to send.
    pub fn send_key(&self) -> u64 {
        self.send_key
    }

    /// Highest sequence number the peer has acknowledged.
    pub fn ackd_key(&self) -> u64 {
        self.ackd_key
    }

    /// Record that the peer acknowledged up to (not including) `key`.
    pub fn ack(&mut self, key: u64) {
        self.ackd_key = self.ackd_key.max(key);
    }
}

/// Sender-side behavior. Implementors supply how to actually put bytes on
/// the wire (`send_item`, `send_gap`) and how to move acknowledged items
/// into archive storage (`archive_item`); `start` drives one pass of
/// send-then-archive-then-resend.
pub trait Sender<I: PqItem> {
    /// Access the sender's watermark/queue state.
    fn state(&self) -> &SenderState<I>;
    /// Mutably access the sender's watermark/queue state.
    fn state_mut(&mut self) -> &mut SenderState<I>;

    /// Attempt to send `item` (found at `state().send_key()`) to the wire.
    fn send_item(&mut self, item: &I) -> SendAttempt;

    /// Attempt to send a gap marker `(start, len)` for a span the sender
    /// has nothing stored for (§4.2 `sendGap_`).
    fn send_gap(&mut self, gap: (u64, u64)) -> SendAttempt;

    /// Move `item` out of the live queue into archive storage. Called for
    /// items between `archive_key` and `ackd_key`, walking backwards.
    fn archive_item(&mut self, item: &I) -> SendAttempt;

    /// Retrieve an archived item covering `key`, for resend of data the
    /// live queue has already shifted out (§4.3 `store.recover`-equivalent
    /// for the sender side).
    fn archived_item_at(&mut self, key: u64) -> Option<I>;

    /// Run one send pass: find the next item at `send_key`; if missing,
    /// emit a gap; advance `send_key` past whatever was attempted only on
    /// success. On failure, `send_key` is left untouched so the next call
    /// resumes at the same point (§4.2 "reverts the watermark to the
    /// pre-call value").
    fn start_send(&mut self) {
        self.state_mut().flags.insert(SenderFlags::SENDING);
        let send_key = self.state().send_key;
        let next_item = self
            .state()
            .queue
            .peek()
            .filter(|i| i.key() == send_key)
            .or_else(|| self.state().queue.peek().filter(|i| i.key() > send_key));

        let outcome = match next_item {
            Some(item) if item.key() == send_key => self.send_item(&item),
            Some(item) => {
                let gap = (send_key, item.key() - send_key);
                self.send_gap(gap)
            }
            None => {
                let tail = self.state().queue.tail_key();
                if tail > send_key {
                    self.send_gap((send_key, tail - send_key))
                } else {
                    self.state_mut().flags.remove(SenderFlags::SENDING);
                    return;
                }
            }
        };

        match outcome {
            SendAttempt::Ok => {
                self.state_mut().flags.remove(SenderFlags::SEND_FAILED);
                let advance_to = self
                    .state()
                    .queue
                    .peek()
                    .filter(|i| i.key() == send_key)
                    .map(|i| i.key() + i.len())
                    .unwrap_or(self.state().queue.tail_key());
                self.state_mut().send_key = advance_to;
            }
            SendAttempt::Failed => {
                self.state_mut().flags.insert(SenderFlags::SEND_FAILED);
            }
        }
        self.state_mut().flags.remove(SenderFlags::SENDING);
    }

    /// Run one archive pass: walks backward from `ackd_key` toward
    /// `archive_key`, archiving items the live queue can then shift out.
    fn start_archive(&mut self) {
        self.state_mut().flags.insert(SenderFlags::ARCHIVING);
        while self.state().archive_key < self.state().ackd_key {
            let Some(item) = self.state().queue.peek() else { break };
            if item.key() != self.state().archive_key {
                break;
            }
            match self.archive_item(&item) {
                SendAttempt::Ok => {
                    self.state_mut().queue.shift();
                    let next = self.state().archive_key + item.len();
                    self.state_mut().archive_key = next;
                }
                SendAttempt::Failed => break,
            }
        }
        self.state_mut().flags.remove(SenderFlags::ARCHIVING);
    }

    /// Run one resend pass for `gap`, consulting the live queue first and
    /// falling back to archived storage, exactly mirroring the receiver's
    /// own layered lookup.
    fn start_resend(&mut self, gap: (u64, u64)) {
        self.state_mut().flags.insert(SenderFlags::RESENDING);
        self.state_mut().resend_gap = Some(gap);

        let (start, _len) = gap;
        let item = self
            .state()
            .queue
            .peek()
            .filter(|i| i.key() == start)
            .or_else(|| self.archived_item_at(start));

        let outcome = match item {
            Some(item) => self.send_item(&item),
            None => self.send_gap(gap),
        };

        match outcome {
            SendAttempt::Ok => {
                self.state_mut().flags.remove(SenderFlags::RESEND_FAILED);
                self.state_mut().resend_gap = None;
            }
            SendAttempt::Failed => {
                self.state_mut().flags.insert(SenderFlags::RESEND_FAILED);
            }
        }
        self.state_mut().flags.remove(SenderFlags::RESENDING);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ByteItem;
    use std::cell::RefCell;

    struct TestSender {
        state: SenderState<ByteItem>,
        sent: RefCell<Vec<u64>>,
        gaps: RefCell<Vec<(u64, u64)>>,
        fail_next: bool,
    }

    impl Sender<ByteItem> for TestSender {
        fn state(&self) -> &SenderState<ByteItem> {
            &self.state
        }
        fn state_mut(&mut self) -> &mut SenderState<ByteItem> {
            &mut self.state
        }
        fn send_item(&mut self, item: &ByteItem) -> SendAttempt {
            if self.fail_next {
                self.fail_next = false;
                return SendAttempt::Failed;
            }
            self.sent.borrow_mut().push(item.key());
            SendAttempt::Ok
        }
        fn send_gap(&mut self, gap: (u64, u64)) -> SendAttempt {
            self.gaps.borrow_mut().push(gap);
            SendAttempt::Ok
        }
        fn archive_item(&mut self, _item: &ByteItem) -> SendAttempt {
            SendAttempt::Ok
        }
        fn archived_item_at(&mut self, _key: u64) -> Option<ByteItem> {
            None
        }
    }

    #[test]
    fn send_advances_watermark_on_success() {
        let mut tx = TestSender {
            state: SenderState::new(0),
            sent: RefCell::new(Vec::new()),
            gaps: RefCell::new(Vec::new()),
            fail_next: false,
        };
        tx.state.queue.enqueue(ByteItem::new(0, b"abc".to_vec()), false);
        tx.start_send();
        assert_eq!(tx.state().send_key(), 3);
        assert_eq!(*tx.sent.borrow(), vec![0]);
    }

    #[test]
    fn failed_send_reverts_watermark() {
        let mut tx = TestSender {
            state: SenderState::new(0),
            sent: RefCell::new(Vec::new()),
            gaps: RefCell::new(Vec::new()),
            fail_next: true,
        };
        tx.state.queue.enqueue(ByteItem::new(0, b"abc".to_vec()), false);
        tx.start_send();
        assert_eq!(tx.state().send_key(), 0);
        assert!(tx.state().flags().contains(SenderFlags::SEND_FAILED));
        tx.start_send();
        assert_eq!(tx.state().send_key(), 3);
    }

    #[test]
    fn missing_item_sends_a_gap() {
        let mut tx = TestSender {
            state: SenderState::new(0),
            sent: RefCell::new(Vec::new()),
            gaps: RefCell::new(Vec::new()),
            fail_next: false,
        };
        tx.state.queue.enqueue(ByteItem::new(5, b"xy".to_vec()), false);
        tx.start_send();
        assert_eq!(*tx.gaps.borrow(), vec![(0, 5)]);
    }
}
