//! Sequence-gap-tolerant delivery queue (§4.2 PQ).
//!
//! [`Queue`] is the ordered, non-overlapping item container; [`Receiver`]
//! and [`Sender`] are the two thin mixins built on top of it that drive a
//! peer connection's resend-request and resend-reply state machines.
#![deny(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod item;
pub mod queue;
pub mod receiver;
pub mod sender;

pub use item::{ByteItem, PqItem};
pub use queue::{Enqueued, Queue, QueueStats};
pub use receiver::{Receiver, ReceivedOutcome, ReceiverFlags, ReceiverState, ReRequestTimer};
pub use sender::{Sender, SendAttempt, SenderFlags, SenderState};
