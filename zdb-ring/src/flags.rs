//! Bit layout for the 32-bit head/tail cursors and the 8-byte per-record
//! header.
//!
//! Indices are packed as `offset | flags` in a single atomic word so every
//! cursor transition is one CAS/store, never a pair. `Wrapped` occupies the
//! same bit in every cursor word (head, reserve, tail) so wrap parity can be
//! compared directly across cursors; the head/reserve word additionally
//! carries `Locked`, and the tail word additionally carries
//! `EndOfFile`/`Waiting` — two bits independent of `Wrapped` and of each
//! other, since the tail wraps in its own right regardless of EOF state.
//! Record headers pack `EndOfFile`/`Waiting` in their top two bits and, in
//! multi-reader mode, a pending-reader bitmask in the low 62.

/// Record alignment in bytes. Every record's header + length-prefix +
/// payload is padded up to a multiple of this so cursors never split a word.
pub const ALIGNMENT: u32 = 16;

/// Size of a record's fixed header, in bytes: `u64` pending-reader mask
/// (or flags-only, outside multi-reader mode) followed by a `u32` payload
/// length.
pub const RECORD_HEADER_LEN: u32 = 12;

/// Bit 29 of a 32-bit cursor: the ring has logically wrapped past the end
/// of its backing region an odd number of times relative to the other
/// cursor. `head_wrapped != tail_wrapped` with equal offsets means full.
/// Every cursor word (head, reserve, tail) tracks its own wrap parity in
/// this same bit position, independent of whatever other flags that word
/// carries, so two cursors' wrap state can always be compared directly.
pub const WRAPPED: u32 = 1 << 29;

/// Bit 31 of the reservation cursor: a multi-writer CAS is in flight
/// claiming space. Losers of the CAS must retry rather than reading the
/// reservation.
pub const LOCKED: u32 = 1 << 31;

/// Bit 30 of the tail cursor: the ring is closed for further writes and,
/// once drained, will report `EndOfFile` instead of blocking. Deliberately
/// a different bit than [`WRAPPED`] — the tail cursor needs to track both
/// independently, since it wraps in its own right (reclaiming space behind
/// the reader) regardless of whether it has ever been marked EOF.
pub const END_OF_FILE: u32 = 1 << 30;

/// Bit 31 of the tail cursor: a blocked writer has parked because the ring
/// is full; the last reader to free space must wake it.
pub const WAITING: u32 = 1 << 31;

/// Mask isolating the byte-offset portion of a cursor word.
pub const OFFSET_MASK: u32 = WRAPPED - 1;

/// Extract the byte offset from a packed cursor.
pub const fn offset(cursor: u32) -> u32 {
    cursor & OFFSET_MASK
}

/// Top bit of the 64-bit record header: end-of-file marker, mirrored from
/// the tail cursor onto the record at the tail so a reader mid-scan can
/// observe EOF without a second load of the shared tail.
pub const RECORD_EOF: u64 = 1 << 63;

/// Second-from-top bit of the record header: a reader is parked on this
/// record waiting for the last pending consumer to clear it.
pub const RECORD_WAITING: u64 = 1 << 62;

/// Maximum number of concurrently attached readers in multi-reader mode.
/// Reader ids occupy bits `0..62` of the record header; bits 62 and 63 are
/// reserved for `RECORD_WAITING`/`RECORD_EOF`.
pub const MAX_READERS: u32 = 62;

/// Mask of the bits in a record header available for the pending-reader
/// bitmask.
pub const READER_MASK: u64 = (1u64 << MAX_READERS) - 1;

/// Header mask bit marking a skip record: a heap-backed (non-mirrored)
/// region's writer plants one of these instead of letting a record
/// straddle the physical end of the buffer. Only ever set on `Heap`
/// regions, which are always single-reader, so it can't collide with a
/// real pending-reader bit.
pub const RECORD_SKIP: u64 = 1 << 0;

/// Round `len` up to the next multiple of [`ALIGNMENT`].
pub const fn align(len: u32) -> u32 {
    (len + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Total on-wire size of a record carrying `payload_len` bytes of payload:
/// header, length prefix, payload, padded to [`ALIGNMENT`].
pub const fn record_span(payload_len: u32) -> u32 {
    align(RECORD_HEADER_LEN + payload_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_ignores_flag_bits() {
        let cursor = 4096 | WRAPPED | LOCKED;
        assert_eq!(offset(cursor), 4096);
    }

    #[test]
    fn align_rounds_up_to_sixteen() {
        assert_eq!(align(0), 0);
        assert_eq!(align(1), 16);
        assert_eq!(align(16), 16);
        assert_eq!(align(17), 32);
    }

    #[test]
    fn record_span_includes_header_and_padding() {
        assert_eq!(record_span(0), align(RECORD_HEADER_LEN));
        assert_eq!(record_span(4), align(RECORD_HEADER_LEN + 4));
    }
}
