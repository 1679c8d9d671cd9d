//! Receiver mixin (§4.2): routes incoming items into the fast `rotate`
//! path or the full `enqueue` path, and drives resend requests off the
//! current gap.
//!
//! The source expresses this as a CRTP mixin (`RxPQ`) that a concrete
//! connection type inherits from; per §9 DESIGN NOTES this becomes a trait
//! with default methods over an accessor (`queue`/`state`), the owning type
//! supplying only `request`/`re_request` (how to actually put a resend
//! request frame on the wire) and the `Key`-tagged item type.

use std::time::Duration;

use tokio::time::Interval;

use crate::item::PqItem;
use crate::queue::{Enqueued, Queue};

bitflags::bitflags! {
    /// State bits for the receiver side, mirroring §4.2's `{Queuing,
    /// Dequeuing}` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReceiverFlags: u8 {
        /// A backlog is being drained through the full `enqueue` path
        /// rather than the `rotate` fast path.
        const QUEUING = 1 << 0;
        /// A drain-to-head loop is actively running (re-entrancy guard).
        const DEQUEUING = 1 << 1;
    }
}

/// The receiver side of a gap-tolerant stream: buffers out-of-order items,
/// delivers in-order ones immediately, and tracks the current gap so a
/// resend request can be issued and periodically retried.
pub struct ReceiverState<I> {
    queue: Queue<I>,
    flags: ReceiverFlags,
    current_gap: Option<(u64, u64)>,
}

impl<I: PqItem> ReceiverState<I> {
    /// Construct a receiver state starting at sequence number `head_key`.
    pub fn new(head_key: u64) -> ReceiverState<I> {
        ReceiverState { queue: Queue::new(head_key), flags: ReceiverFlags::empty(), current_gap: None }
    }

    /// The underlying ordered item store.
    pub fn queue(&self) -> &Queue<I> {
        &self.queue
    }

    /// Mutable access to the underlying item store.
    pub fn queue_mut(&mut self) -> &mut Queue<I> {
        &mut self.queue
    }

    /// Current state bits.
    pub fn flags(&self) -> ReceiverFlags {
        self.flags
    }

    /// The gap as of the last `received`/`gap` recomputation, if any.
    pub fn current_gap(&self) -> Option<(u64, u64)> {
        self.current_gap
    }
}

/// Outcome of [`Receiver::received`]: whether the caller should deliver an
/// item to the application immediately, and whether the gap changed enough
/// that a fresh resend request should go out.
#[derive(Debug)]
pub struct ReceivedOutcome<I> {
    /// An item ready for immediate delivery in sequence order, if any.
    /// Present on the `rotate` fast path and whenever draining the queue
    /// after a gap closes yields further in-order items.
    pub deliverable: Vec<I>,
    /// The gap changed since the previous call; the caller should cancel
    /// any pending re-request timer and issue a fresh `request`.
    pub gap_changed: bool,
}

/// Receiver-side behavior, parameterized over the concrete item type.
/// Implementors supply `state`/`state_mut` (where the queue and flags
/// live) and `request`/`re_request` (how to put a resend-request frame on
/// the wire); `received` and `gap` are provided.
pub trait Receiver<I: PqItem> {
    /// Access the receiver's queue/flags state.
    fn state(&self) -> &ReceiverState<I>;
    /// Mutably access the receiver's queue/flags state.
    fn state_mut(&mut self) -> &mut ReceiverState<I>;

    /// Emit a resend request for `gap` (the `(start, len)` interval
    /// computed by [`Queue::gap`]). Called once when the gap first opens or
    /// changes shape, and periodically thereafter by [`re_request`].
    fn request(&mut self, gap: (u64, u64), now: tokio::time::Instant);

    /// Periodic resend-request retry while a gap remains open.
    fn re_request(&mut self, now: tokio::time::Instant);

    /// Route an incoming item: the fast path (`rotate`) when it lands
    /// exactly at `head_key` and nothing is queued ahead of it, otherwise
    /// the full `enqueue` path (§4.2 "falls back to enqueue while queuing
    /// or draining").
    fn received(&mut self, item: I, now: tokio::time::Instant) -> ReceivedOutcome<I> {
        let queuing = self.state().flags.contains(ReceiverFlags::QUEUING);
        let fast_path = !queuing && item.key() == self.state().queue.head_key();

        let mut deliverable = Vec::new();
        match self.state_mut().queue.enqueue(item, fast_path) {
            Enqueued::Rotated(delivered) => deliverable.push(delivered),
            Enqueued::Stored => {
                self.state_mut().flags.insert(ReceiverFlags::QUEUING);
                while let Some(next) = self.state_mut().queue.dequeue() {
                    deliverable.push(next);
                }
                if self.state().queue.peek().is_none() {
                    self.state_mut().flags.remove(ReceiverFlags::QUEUING);
                }
            }
            Enqueued::Dropped => {}
        }

        let new_gap = self.state().queue.gap();
        let gap_changed = new_gap != self.state().current_gap;
        self.state_mut().current_gap = new_gap;

        if gap_changed {
            if let Some(gap) = new_gap {
                tracing::debug!(start = gap.0, len = gap.1, "sequence gap opened, requesting resend");
                self.request(gap, now);
            }
        }

        ReceivedOutcome { deliverable, gap_changed }
    }
}

/// A periodic re-request driver: owns a [`tokio::time::Interval`] so
/// cancellation is simply dropping the owning task (§9 cooperative
/// shutdown), rather than a raw cancellable timer handle.
pub struct ReRequestTimer {
    interval: Interval,
}

impl ReRequestTimer {
    /// Build a re-request ticker firing every `period`.
    pub fn new(period: Duration) -> ReRequestTimer {
        ReRequestTimer { interval: tokio::time::interval(period) }
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) -> tokio::time::Instant {
        self.interval.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ByteItem;

    struct TestReceiver {
        state: ReceiverState<ByteItem>,
        requests: Vec<(u64, u64)>,
    }

    impl Receiver<ByteItem> for TestReceiver {
        fn state(&self) -> &ReceiverState<ByteItem> {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ReceiverState<ByteItem> {
            &mut self.state
        }

        fn request(&mut self, gap: (u64, u64), _now: tokio::time::Instant) {
            self.requests.push(gap);
        }

        fn re_request(&mut self, now: tokio::time::Instant) {
            if let Some(gap) = self.state.current_gap {
                self.request(gap, now);
            }
        }
    }

    #[tokio::test]
    async fn in_order_item_delivers_immediately_via_rotate() {
        let mut rx = TestReceiver { state: ReceiverState::new(0), requests: Vec::new() };
        let now = tokio::time::Instant::now();
        let outcome = rx.received(ByteItem::new(0, b"abc".to_vec()), now);
        assert_eq!(outcome.deliverable.len(), 1);
        assert!(rx.requests.is_empty());
        assert_eq!(rx.state().queue.head_key(), 3);
    }

    #[tokio::test]
    async fn out_of_order_item_opens_a_gap_and_requests_once() {
        let mut rx = TestReceiver { state: ReceiverState::new(0), requests: Vec::new() };
        let now = tokio::time::Instant::now();
        let outcome = rx.received(ByteItem::new(5, b"xy".to_vec()), now);
        assert!(outcome.deliverable.is_empty());
        assert_eq!(rx.requests, vec![(0, 5)]);

        // Re-receiving the same gap shape should not issue another request.
        let outcome2 = rx.received(ByteItem::new(5, b"xy".to_vec()), now);
        assert!(!outcome2.gap_changed);
        assert_eq!(rx.requests.len(), 1);
    }

    #[tokio::test]
    async fn filling_the_gap_delivers_the_backlog_in_order() {
        let mut rx = TestReceiver { state: ReceiverState::new(0), requests: Vec::new() };
        let now = tokio::time::Instant::now();
        rx.received(ByteItem::new(3, b"def".to_vec()), now);
        let outcome = rx.received(ByteItem::new(0, b"abc".to_vec()), now);
        assert_eq!(outcome.deliverable.len(), 2);
        assert_eq!(rx.state().queue.head_key(), 6);
        assert_eq!(rx.state().current_gap(), None);
    }
}
