//! Errors returned by ring construction and record access.

/// Failure modes specific to a ring buffer.
///
/// A ring spans a process boundary in IPC mode, so a misbehaving peer must
/// never be able to trigger undefined behavior here: oversized records are
/// always rejected with [`RingError::RecordTooLarge`] rather than asserted
/// against in release builds.
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// `open()` was asked for a size that is not a power-of-two multiple of
    /// the 16-byte record alignment.
    #[error("ring size {0} is not a power-of-two multiple of the record alignment")]
    InvalidSize(u32),

    /// A requested record (header + length prefix + payload, aligned) does
    /// not fit in the ring at all, regardless of current occupancy.
    #[error("record of {requested} bytes exceeds ring capacity of {capacity} bytes")]
    RecordTooLarge {
        /// Bytes requested by the caller.
        requested: u32,
        /// Total usable capacity of the ring.
        capacity: u32,
    },

    /// Mirrored (doubly-mapped) memory setup failed: `memfd_create`,
    /// `ftruncate`, or one of the two `mmap` calls returned an error.
    #[error("failed to set up mirrored IPC mapping: {0}")]
    MirrorMapping(#[source] std::io::Error),

    /// `attach()` was called on a multi-reader ring that already has
    /// `MaxReaders` (62) readers attached.
    #[error("ring already has the maximum of {0} readers attached")]
    TooManyReaders(u32),

    /// A reader id used in `detach()`/`shift2()` was not currently attached.
    #[error("reader id {0} is not attached")]
    NotAttached(u32),

    /// Timed out waiting for space (push) or data (shift) within the
    /// configured `timeout`.
    #[error("timed out waiting for the ring to become ready")]
    TimedOut,
}

/// Result alias for ring operations.
pub type Result<T> = std::result::Result<T, RingError>;
