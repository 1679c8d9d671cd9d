//! Lock-free shared-memory ring buffer.
//!
//! A `Ring` is a fixed-capacity byte region (§3.1 Region) with a
//! [`control::ControlBlock`] of atomic head/tail cursors. One writer (or, in
//! multi-writer mode, any number of writers racing a CAS) pushes
//! variable-length records; one reader (or, in multi-reader mode, up to
//! [`flags::MAX_READERS`] attached readers) shifts them back off in FIFO
//! order.
//!
//! The const generics `MW`/`MR` select multi-writer/multi-reader behavior at
//! compile time — the Rust rendition of the source's CRTP mixin point (§9
//! DESIGN NOTES): a `Ring<false, false>` is the cheapest SPSC shape with no
//! CAS and no reader bitmap at all.
#![deny(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod blocker;
pub mod control;
pub mod error;
pub mod flags;
pub mod region;

use std::sync::atomic::Ordering;
use std::time::Duration;

use blocker::{Blocker, BlockerParams};
use control::ControlBlock;
pub use error::{Result, RingError};
use flags::{
    align, offset, record_span, MAX_READERS, OFFSET_MASK, RECORD_EOF, RECORD_HEADER_LEN,
    RECORD_SKIP, RECORD_WAITING, WAITING, WRAPPED,
};
use region::Region;

/// Mode a ring is opened in. Mirrors POSIX-style open flags: a process that
/// only ever reads never needs write access to the region (and vice versa),
/// and a single process doing both (the common in-process fan-out case)
/// asks for `ReadWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Consume records only.
    Read,
    /// Produce records only.
    Write,
    /// Both produce and consume (typical for an in-process, single-mapping
    /// ring shared by a writer and co-located readers).
    ReadWrite,
}

/// Construction parameters for a ring, per §6.2.
#[derive(Debug, Clone, Copy)]
pub struct RingParams {
    /// Ring capacity in bytes; rounded up to a power of two multiple of
    /// [`flags::ALIGNMENT`] by [`Ring::open`].
    pub size: u32,
    /// Low-latency mode: a blocked push/shift spins exclusively rather than
    /// ever parking. Appropriate only for dedicated-core deployments.
    pub low_latency: bool,
    /// Busy-spin iterations attempted before parking, when not low-latency.
    pub spin: u32,
    /// Upper bound a blocking push/shift call may wait before returning
    /// [`RingError::TimedOut`].
    pub timeout: Duration,
}

impl Default for RingParams {
    fn default() -> Self {
        RingParams { size: 1 << 20, low_latency: false, spin: 1000, timeout: Duration::MAX }
    }
}

/// Status reported by [`Ring::read_status`]/[`Ring::write_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingStatus {
    /// Data is available to shift / room is available to push.
    Ready,
    /// Nothing to shift right now / no room to push right now; neither is
    /// an error, the caller should retry or block.
    Empty,
    /// The ring has been marked EOF and drained; no further records will
    /// ever arrive.
    EndOfFile,
    /// A multi-reader ring has no attached readers, so a write would never
    /// be observed. Per §9's open question, this crate reports `NotReady`
    /// rather than guessing whether the writer should block or drop; the
    /// caller decides.
    NotReady,
}

/// A handle to one record reserved by [`Ring::push`], not yet published.
/// The caller writes into [`ReservedWrite::bytes`] and then calls
/// [`Ring::push2`], which is what actually advances the head readers see —
/// until then the record is reserved (no other writer can alias it) but
/// invisible.
pub struct ReservedWrite<'a> {
    /// Writable payload area sized to what the caller asked for.
    pub bytes: &'a mut [u8],
    /// The published head value this reservation's turn is waiting on:
    /// `push2` stalls until `control.head` reaches this, so multi-writer
    /// publication happens in reservation order even if writers finish
    /// filling in their payload out of order.
    ticket: u32,
    /// The published head value `push2` stores once it's this
    /// reservation's turn.
    publish: u32,
}

/// A shared-memory record ring. `MW` enables multi-writer CAS-based head
/// advance; `MR` enables the per-record reader bitmask, `attach`/`detach`,
/// and per-reader private tails.
pub struct Ring<const MW: bool, const MR: bool> {
    region: Region,
    control: ControlBlock,
    push_blocker: Blocker,
    shift_blocker: Blocker,
    mode: OpenMode,
    params: RingParams,
    /// Per-reader private tail cursors, indexed by reader id. Only used
    /// when `MR`.
    reader_tails: [std::sync::atomic::AtomicU32; MAX_READERS as usize],
}

impl<const MW: bool, const MR: bool> Ring<MW, MR> {
    /// Open a new ring, allocating its backing region.
    ///
    /// Multi-reader rings always use a [`Region::mirrored`] region so a
    /// record that wraps past the end of the buffer still reads as one flat
    /// span without readers needing to special-case the wrap; single-reader
    /// rings use a plain heap region, since SPSC/MPSC never needs true
    /// cross-process sharing in this workspace (the only IPC consumer is
    /// the broadcast fan-out case, which is always multi-reader).
    pub fn open(mode: OpenMode, params: RingParams) -> Result<Ring<MW, MR>> {
        let size = params.size.next_power_of_two();
        if size == 0 || size % flags::ALIGNMENT != 0 {
            return Err(RingError::InvalidSize(params.size));
        }

        let region = if MR { Region::mirrored(size)? } else { Region::heap(size) };

        let blocker_params =
            BlockerParams { spin: if params.low_latency { u32::MAX } else { params.spin }, timeout: params.timeout };

        Ok(Ring {
            region,
            control: ControlBlock::new(),
            push_blocker: Blocker::new(blocker_params),
            shift_blocker: Blocker::new(blocker_params),
            mode,
            params,
            reader_tails: std::array::from_fn(|_| std::sync::atomic::AtomicU32::new(0)),
        })
    }

    /// Ring capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.region.capacity()
    }

    fn is_full(&self, reserve: u32, tail: u32, span: u32) -> bool {
        let used = offset(reserve).wrapping_sub(offset(tail)) & OFFSET_MASK;
        let used = if (reserve ^ tail) & WRAPPED != 0 && offset(reserve) <= offset(tail) {
            used + self.capacity()
        } else {
            used
        };
        // One blank header must remain reachable ahead of the tail so a
        // blocked reader always has a zero header to observe instead of
        // running off the end of published data (§3.1 invariants).
        used + span + RECORD_HEADER_LEN as u32 > self.capacity()
    }

    /// Writes a skip-marker header at `offset`, claimed space a heap region
    /// can't let a record straddle. Fully self-contained (no caller-filled
    /// payload), so unlike a real record it's safe to write synchronously,
    /// before the reservation that owns it is even published.
    fn write_skip_marker(&self, at: u32, len: u32) {
        // SAFETY: `at..at+len` is the gap this reservation just claimed on
        // `control.reserve`; no other writer can alias it until its own
        // ticket comes up in `push2`, and no reader can reach it until this
        // writer's `push2` publishes past it.
        let header = unsafe { self.region.slice_mut(at, RECORD_HEADER_LEN) };
        header[..8].copy_from_slice(&RECORD_SKIP.to_le_bytes());
        header[8..12].copy_from_slice(&len.to_le_bytes());
    }

    /// Try to reserve `len` payload bytes without blocking. Returns `None`
    /// on Full; returns `Err(EndOfFile)`-shaped status via `try_push`'s
    /// caller, not here — this is the non-blocking primitive `push` retries
    /// around.
    ///
    /// Returns `(record_offset, span, ticket, publish)`: `record_offset` is
    /// where the caller writes the record itself (it can differ from the
    /// old reservation offset when a skip marker was planted ahead of it);
    /// `ticket`/`publish` are threaded through to [`Ring::push2`], which
    /// actually advances `control.head`.
    fn try_reserve(&self, len: u32) -> Option<(u32, u32, u32, u32)> {
        let span = record_span(len);
        if span > self.capacity() {
            return None;
        }

        loop {
            let reserve = self.control.reserve.load(Ordering::Acquire);
            let tail = self.control.tail.load(Ordering::Acquire);

            if tail & flags::END_OF_FILE != 0 {
                return None;
            }

            // Heap regions can't read a record that straddles the physical
            // end of the buffer: if the remaining contiguous space is too
            // small, plant a skip marker there and place the record at
            // offset zero instead (§3.1 ADD).
            let wrap_gap = if self.region.supports_wraparound() {
                0
            } else {
                let remaining = self.capacity() - offset(reserve);
                if remaining < span { remaining } else { 0 }
            };
            let total = wrap_gap + span;

            if self.is_full(reserve, tail, total) {
                return None;
            }

            let record_offset = if wrap_gap > 0 { 0 } else { offset(reserve) };
            let new_offset = (record_offset + span) % self.capacity();
            let crossed = wrap_gap > 0 || record_offset + span >= self.capacity();
            let new_reserve = new_offset | ((reserve & WRAPPED) ^ if crossed { WRAPPED } else { 0 });

            if !MW {
                if wrap_gap > 0 {
                    self.write_skip_marker(offset(reserve), wrap_gap);
                }
                self.control.reserve.store(new_reserve, Ordering::Release);
                return Some((record_offset, span, reserve, new_reserve));
            }

            // Multi-writer: CAS in the Locked bit first so a loser
            // immediately retries rather than reading a half-reserved
            // reservation.
            if reserve & flags::LOCKED != 0 {
                std::hint::spin_loop();
                continue;
            }
            let locked_reserve = reserve | flags::LOCKED;
            if self
                .control
                .reserve
                .compare_exchange(reserve, locked_reserve, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            if wrap_gap > 0 {
                self.write_skip_marker(offset(reserve), wrap_gap);
            }
            self.control.reserve.store(new_reserve, Ordering::Release);
            return Some((record_offset, span, reserve, new_reserve));
        }
    }

    /// Reserve room for one record of `len` payload bytes, blocking
    /// according to `self.params` if the ring is full. Returns `None` only
    /// on `EndOfFile`.
    pub fn push(&self, len: u32) -> Result<Option<ReservedWrite<'_>>> {
        if record_span(len) > self.capacity() {
            return Err(RingError::RecordTooLarge { requested: len, capacity: self.capacity() });
        }

        loop {
            if let Some((record_offset, span, ticket, publish)) = self.try_reserve(len) {
                // SAFETY: the reservation above is exclusive to this
                // caller (or this CAS winner): no other writer's
                // reservation can alias `[record_offset, record_offset+span)`
                // until this writer calls `push2`, and no reader can reach
                // it until `push2` advances the published head past it.
                let record = unsafe { self.region.slice_mut(record_offset, span) };
                let (header, rest) = record.split_at_mut(RECORD_HEADER_LEN as usize);
                header[..8].copy_from_slice(&u64::to_le_bytes(if MR { flags::READER_MASK } else { 0 }));
                header[8..12].copy_from_slice(&len.to_le_bytes());
                let bytes = &mut rest[..len as usize];
                return Ok(Some(ReservedWrite { bytes, ticket, publish }));
            }

            let tail = self.control.tail.load(Ordering::Acquire);
            if tail & flags::END_OF_FILE != 0 {
                return Ok(None);
            }

            self.control.tail.fetch_or(WAITING, Ordering::AcqRel);
            match self.push_blocker.wait(&self.control.tail, |t| {
                t & flags::END_OF_FILE != 0
                    || !self.is_full(self.control.reserve.load(Ordering::Acquire), t, record_span(len))
            }) {
                Ok(_) => continue,
                Err(RingError::TimedOut) => return Err(RingError::TimedOut),
                Err(e) => return Err(e),
            }
        }
    }

    /// Publish a record reserved by [`push`](Ring::push): this is the sole
    /// place `control.head` advances, and only after the caller has
    /// finished filling in [`ReservedWrite::bytes`] — so a reader can never
    /// observe a record whose payload isn't fully written yet.
    ///
    /// For a multi-writer ring, publication happens in reservation order:
    /// if an earlier writer is still mid-write, this spins until its
    /// `push2` runs, even if this record's own payload was filled in
    /// first.
    pub fn push2(&self, reserved: ReservedWrite<'_>) {
        while self.control.head.load(Ordering::Acquire) != reserved.ticket {
            std::hint::spin_loop();
        }
        self.control.head.store(reserved.publish, Ordering::Release);

        self.control.in_count.fetch_add(1, Ordering::Relaxed);
        self.control.in_bytes.fetch_add(reserved.bytes.len() as u64, Ordering::Relaxed);
        self.shift_blocker.wake_all();
    }

    /// Attach as a new reader (multi-reader rings only). Returns the
    /// assigned reader id (`0..MAX_READERS`).
    pub fn attach(&self) -> Result<u32> {
        debug_assert!(MR, "attach() is only meaningful on multi-reader rings");
        loop {
            let attached = self.control.attached.load(Ordering::Acquire);
            if attached.count_ones() as u32 >= MAX_READERS {
                return Err(RingError::TooManyReaders(MAX_READERS));
            }
            let id = attached.trailing_ones() as u32;
            let bit = 1u64 << id;
            if self
                .control
                .attached
                .compare_exchange(attached, attached | bit, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            self.control.attach_generation.fetch_add(1, Ordering::AcqRel);
            // A freshly attached reader starts at the current head: it only
            // sees records published after attaching, per §4.1 "scan
            // forward past records not addressed to it" — for a brand-new
            // reader id, nothing older carries its bit, so there is nothing
            // to scan past.
            self.reader_tails[id as usize].store(self.control.head.load(Ordering::Acquire) & OFFSET_MASK, Ordering::Release);
            return Ok(id);
        }
    }

    /// Detach reader `id` (multi-reader rings only): clear its bit on every
    /// record it has not yet consumed, then release the id.
    pub fn detach(&self, id: u32) -> Result<()> {
        debug_assert!(MR);
        let bit = 1u64 << id;
        if self.control.attached.load(Ordering::Acquire) & bit == 0 {
            return Err(RingError::NotAttached(id));
        }

        let mut cursor = self.reader_tails[id as usize].load(Ordering::Acquire);
        let head = self.control.head.load(Ordering::Acquire) & OFFSET_MASK;
        while cursor != head {
            // SAFETY: `cursor` is within `[tail, head)`, published records
            // only, per the reader's own advancing tail.
            let header = unsafe { self.region.slice_mut(cursor, 8) };
            let mut mask = u64::from_le_bytes(header[..8].try_into().unwrap());
            mask &= !bit;
            header[..8].copy_from_slice(&mask.to_le_bytes());
            // SAFETY: header length prefix was written at push time and is
            // immutable thereafter.
            let len_bytes = unsafe { self.region.slice(cursor + 8, 4) };
            let len = u32::from_le_bytes(len_bytes.try_into().unwrap());
            cursor = (cursor + record_span(len)) % self.capacity();
            if mask & flags::READER_MASK == 0 {
                self.push_blocker.wake_all();
            }
        }

        self.control.attached.fetch_and(!bit, Ordering::AcqRel);
        self.control.attach_generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn reader_cursor(&self, reader: Option<u32>) -> &std::sync::atomic::AtomicU32 {
        match reader {
            Some(id) => &self.reader_tails[id as usize],
            None => &self.control.tail,
        }
    }

    /// Shift the next record off the ring for single-reader use. Returns
    /// `None` on `Empty`/`EndOfFile`-and-drained.
    pub fn shift(&self) -> Result<Option<ShiftedRecord<'_>>> {
        debug_assert!(!MR);
        self.shift_for(None)
    }

    /// Shift the next record addressed to `reader` (multi-reader rings).
    pub fn shift_as(&self, reader: u32) -> Result<Option<ShiftedRecord<'_>>> {
        debug_assert!(MR);
        self.shift_for(Some(reader))
    }

    fn shift_for(&self, reader: Option<u32>) -> Result<Option<ShiftedRecord<'_>>> {
        loop {
            let cursor_atomic = self.reader_cursor(reader);
            let mut cursor = cursor_atomic.load(Ordering::Acquire);
            let head = self.control.head.load(Ordering::Acquire);

            if offset(cursor) == offset(head) && (cursor & WRAPPED) == (head & WRAPPED) {
                let tail_flags = self.control.tail.load(Ordering::Acquire);
                if tail_flags & flags::END_OF_FILE != 0 {
                    return Ok(None);
                }
                self.control.tail.fetch_or(WAITING, Ordering::AcqRel);
                match self.shift_blocker.wait(&self.control.head, |h| {
                    offset(h) != offset(cursor) || (h & WRAPPED) != (cursor & WRAPPED)
                }) {
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }

            // SAFETY: `cursor` lies in `[tail, head)`, the range of
            // published, not-yet-fully-consumed records.
            let header = unsafe { self.region.slice(offset(cursor), 8) };
            let mask = u64::from_le_bytes(header.try_into().unwrap());

            if !MR && mask & RECORD_SKIP != 0 {
                // A heap region's skip marker: nothing to hand back, jump
                // straight to offset zero (toggling Wrapped, same as the
                // writer did when it planted this marker) and re-check for
                // the real record that follows. (Only `!MR` rings ever use
                // a heap region, so only they ever plant one; bit 0 of the
                // mask word is a legitimate pending-reader bit otherwise.)
                let new_cursor = (cursor & WRAPPED) ^ WRAPPED;
                cursor_atomic.store(new_cursor, Ordering::Release);
                self.push_blocker.wake_all();
                continue;
            }

            // SAFETY: the 4-byte length prefix directly follows the 8-byte
            // reader-mask/flags word within the same published header.
            let len_field = unsafe { self.region.slice(offset(cursor) + 8, 4) };
            let len = u32::from_le_bytes(len_field.try_into().unwrap());
            let span = record_span(len);

            if MR {
                if let Some(id) = reader {
                    if mask & (1u64 << id) == 0 {
                        // Already consumed by us in a previous pass (can
                        // happen after a retry); skip forward.
                        cursor = (offset(cursor) + span) % self.capacity() | (cursor & WRAPPED);
                        cursor_atomic.store(cursor, Ordering::Release);
                        continue;
                    }
                }
            }

            // SAFETY: payload lies entirely within the reserved span
            // written by the producer at push time.
            let payload = unsafe { self.region.slice(offset(cursor) + RECORD_HEADER_LEN, len) };

            let mut next = offset(cursor) + span;
            let mut wrap_bit = cursor & WRAPPED;
            if next >= self.capacity() {
                next %= self.capacity();
                wrap_bit ^= WRAPPED;
            }

            return Ok(Some(ShiftedRecord {
                payload,
                cursor_offset: offset(cursor),
                len,
                reader,
                next: next | wrap_bit,
            }));
        }
    }

    /// Complete a [`shift`](Ring::shift)/[`shift_as`](Ring::shift_as):
    /// advances the (private, for MR) tail cursor and, for MR, clears the
    /// reader's bit in the record header; when the header's mask reaches
    /// zero the space becomes reclaimable and any parked writer is woken.
    pub fn shift2(&self, record: ShiftedRecord<'_>) {
        self.control.out_count.fetch_add(1, Ordering::Relaxed);
        self.control.out_bytes.fetch_add(record.len as u64, Ordering::Relaxed);

        if MR {
            let id = record.reader.expect("MR shift always carries a reader id");
            // SAFETY: header at `cursor_offset` was read (not yet cleared)
            // by `shift_for` under this same reader's ownership.
            let header = unsafe { self.region.slice_mut(record.cursor_offset, 8) };
            let mut mask = u64::from_le_bytes(header[..8].try_into().unwrap());
            mask &= !(1u64 << id);
            header[..8].copy_from_slice(&mask.to_le_bytes());
            self.reader_tails[id as usize].store(record.next, Ordering::Release);
            if mask & flags::READER_MASK == 0 {
                self.push_blocker.wake_all();
            }
        } else {
            self.control.tail.store(
                record.next | (self.control.tail.load(Ordering::Relaxed) & (flags::END_OF_FILE | WAITING)),
                Ordering::Release,
            );
            self.push_blocker.wake_all();
        }
    }

    /// Set or clear `EndOfFile`. Writes the flag onto the tail cursor, and
    /// (multi-reader only) onto the header at the current head so that a
    /// reader blocked on a record header, not the head cursor, can also
    /// observe EOF without a second shared load (§4.1 `eof`).
    pub fn eof(&self, set: bool) {
        let tail = self.control.tail.load(Ordering::Acquire);
        let new_tail = if set { tail | flags::END_OF_FILE } else { tail & !flags::END_OF_FILE };
        self.control.tail.store(new_tail, Ordering::Release);
        self.shift_blocker.wake_all();
        self.push_blocker.wake_all();
    }

    /// Non-blocking status for a reader: `Ready` if at least one record is
    /// available, `EndOfFile` if drained and closed, else `Empty`.
    pub fn read_status(&self) -> RingStatus {
        let head = self.control.head.load(Ordering::Acquire);
        let tail = self.control.tail.load(Ordering::Acquire);
        if offset(head) != offset(tail) || (head & WRAPPED) != (tail & WRAPPED) {
            return RingStatus::Ready;
        }
        if tail & flags::END_OF_FILE != 0 {
            return RingStatus::EndOfFile;
        }
        RingStatus::Empty
    }

    /// Non-blocking status for a writer. Reports `NotReady` for a
    /// multi-reader ring with nobody attached, per the §9 open question
    /// this crate resolves as "tell the caller, don't guess" (see
    /// DESIGN.md).
    pub fn write_status(&self, len: u32) -> RingStatus {
        let tail = self.control.tail.load(Ordering::Acquire);
        if tail & flags::END_OF_FILE != 0 {
            return RingStatus::EndOfFile;
        }
        if MR && self.control.attached.load(Ordering::Acquire) == 0 {
            return RingStatus::NotReady;
        }
        let reserve = self.control.reserve.load(Ordering::Acquire);
        if self.is_full(reserve, tail, record_span(len)) {
            return RingStatus::Empty;
        }
        RingStatus::Ready
    }

    /// Mode this ring was opened in.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Construction parameters this ring was opened with.
    pub fn params(&self) -> RingParams {
        self.params
    }
}

/// A record handed back by [`Ring::shift`]/[`Ring::shift_as`]. Dropping it
/// without calling [`Ring::shift2`] leaks the reservation (the space is
/// never reclaimed and, for MR, other readers' bits are unaffected) — this
/// mirrors the source's explicit two-phase `shift`/`shift2` API rather than
/// hiding completion in `Drop`, since a caller may want to inspect the
/// payload before deciding whether consuming it is actually safe (e.g. a
/// reassembly layer that needs the whole frame before committing to it).
pub struct ShiftedRecord<'a> {
    /// The record's payload bytes.
    pub payload: &'a [u8],
    cursor_offset: u32,
    len: u32,
    reader: Option<u32>,
    next: u32,
}

impl<'a> ShiftedRecord<'a> {
    /// Payload length in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// True if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

const _: () = assert!(align(0) == 0);
const _: () = assert!(RECORD_EOF != 0 && RECORD_WAITING != 0, "keep flag constants referenced");

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: u32) -> RingParams {
        RingParams { size, low_latency: false, spin: 16, timeout: Duration::from_millis(200) }
    }

    #[test]
    fn s1_spsc_fixed_size_round_trip() {
        let ring: Ring<false, false> = Ring::open(OpenMode::ReadWrite, params(1 << 16)).unwrap();
        for i in 0..1000u32 {
            let mut reserved = ring.push(8).unwrap().expect("ring has room");
            reserved.bytes.copy_from_slice(&[i as u8; 8]);
            ring.push2(reserved);
        }
        for i in 0..1000u32 {
            let record = ring.shift().unwrap().expect("record was pushed");
            assert_eq!(record.payload, &[i as u8; 8]);
            ring.shift2(record);
        }
        assert_eq!(ring.read_status(), RingStatus::Empty);
    }

    #[test]
    fn s2_spmc_variable_size_then_eof() {
        let ring: Ring<false, true> = Ring::open(OpenMode::ReadWrite, params(1 << 16)).unwrap();
        let reader_a = ring.attach().unwrap();
        let reader_b = ring.attach().unwrap();

        for payload in [b"a".as_slice(), b"bb", b"ccc"] {
            let mut reserved = ring.push(payload.len() as u32).unwrap().unwrap();
            reserved.bytes.copy_from_slice(payload);
            ring.push2(reserved);
        }
        ring.eof(true);

        for reader in [reader_a, reader_b] {
            for expected in [b"a".as_slice(), b"bb", b"ccc"] {
                let record = ring.shift_as(reader).unwrap().expect("record was pushed");
                assert_eq!(record.payload, expected);
                ring.shift2(record);
            }
            assert!(ring.shift_as(reader).unwrap().is_none());
        }
    }

    #[test]
    fn full_ring_rejects_oversized_record() {
        let ring: Ring<false, false> = Ring::open(OpenMode::Write, params(64)).unwrap();
        let err = ring.push(1024).unwrap_err();
        assert!(matches!(err, RingError::RecordTooLarge { .. }));
    }

    #[test]
    fn attach_assigns_distinct_ids_and_detach_releases_them() {
        let ring: Ring<false, true> = Ring::open(OpenMode::ReadWrite, params(4096)).unwrap();
        let a = ring.attach().unwrap();
        let b = ring.attach().unwrap();
        assert_ne!(a, b);
        ring.detach(a).unwrap();
        let c = ring.attach().unwrap();
        assert_eq!(a, c);
        assert!(matches!(ring.detach(a), Ok(())));
        ring.detach(b).unwrap();
    }

    #[test]
    fn write_status_reports_not_ready_with_no_attached_readers() {
        let ring: Ring<false, true> = Ring::open(OpenMode::Write, params(4096)).unwrap();
        assert_eq!(ring.write_status(8), RingStatus::NotReady);
        let reader = ring.attach().unwrap();
        assert_eq!(ring.write_status(8), RingStatus::Ready);
        ring.detach(reader).unwrap();
    }

    #[test]
    fn heap_ring_wraps_past_the_end_without_corruption() {
        // 128-byte ring, 48-byte records: the first two consume the whole
        // buffer exactly (0..48, 48..96), so the third — placed right
        // after the second is freed — can't fit in the remaining 32 bytes
        // before the physical end and forces a skip marker to offset zero.
        let ring: Ring<false, false> = Ring::open(OpenMode::ReadWrite, params(128)).unwrap();

        let push_and_shift = |payload: &[u8]| {
            let mut reserved = ring.push(payload.len() as u32).unwrap().expect("ring has room");
            reserved.bytes.copy_from_slice(payload);
            ring.push2(reserved);
            let record = ring.shift().unwrap().expect("record was pushed");
            assert_eq!(record.payload, payload);
            ring.shift2(record);
        };

        push_and_shift(&[1u8; 36]);
        push_and_shift(&[2u8; 36]);
        // The writer's reservation frontier sits at offset 96 with only 32
        // bytes of physical room left — this one must skip to zero.
        push_and_shift(&[3u8; 36]);

        assert_eq!(ring.read_status(), RingStatus::Empty);
    }

    #[test]
    fn heap_ring_wraps_many_times_under_sustained_traffic() {
        // Capacity far smaller than the total bytes pushed, forcing
        // repeated skip-marker wraps; every record must still round-trip.
        let ring: Ring<false, false> = Ring::open(OpenMode::ReadWrite, params(512)).unwrap();
        for i in 0..500u32 {
            let len = 8 + (i % 5) * 4;
            let payload: Vec<u8> = (0..len).map(|b| (i ^ b) as u8).collect();
            let mut reserved = ring.push(len).unwrap().expect("ring has room");
            reserved.bytes.copy_from_slice(&payload);
            ring.push2(reserved);

            let record = ring.shift().unwrap().expect("record was pushed");
            assert_eq!(record.payload, payload.as_slice());
            ring.shift2(record);
        }
        assert_eq!(ring.read_status(), RingStatus::Empty);
    }

    #[test]
    fn push2_is_what_publishes_a_record_not_push() {
        // Reserve a record but don't publish it yet: a reader must see
        // Empty, not the (still half-written) record, until `push2` runs.
        let ring: Ring<false, false> = Ring::open(OpenMode::ReadWrite, params(4096)).unwrap();
        let mut reserved = ring.push(8).unwrap().expect("ring has room");
        // Non-blocking: the reservation is claimed but not yet published,
        // so there is nothing for a reader to see.
        assert_eq!(ring.read_status(), RingStatus::Empty);

        reserved.bytes.copy_from_slice(&[7u8; 8]);
        ring.push2(reserved);

        assert_eq!(ring.read_status(), RingStatus::Ready);
        let record = ring.shift().unwrap().expect("record was published");
        assert_eq!(record.payload, &[7u8; 8]);
        ring.shift2(record);
    }

    #[test]
    fn concurrent_reader_never_observes_a_record_before_push2() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;
        use std::thread;

        let ring: Arc<Ring<false, false>> = Arc::new(Ring::open(OpenMode::ReadWrite, params(4096)).unwrap());
        let published = Arc::new(AtomicBool::new(false));

        let writer_ring = Arc::clone(&ring);
        let writer_published = Arc::clone(&published);
        let writer = thread::spawn(move || {
            let mut reserved = writer_ring.push(8).unwrap().expect("ring has room");
            // Simulate a slow write: the record is reserved (space claimed)
            // well before its payload, and therefore its visibility to
            // readers, is finalized.
            thread::sleep(Duration::from_millis(30));
            reserved.bytes.copy_from_slice(&[9u8; 8]);
            writer_published.store(true, Ordering::Release);
            writer_ring.push2(reserved);
        });

        for _ in 0..5 {
            thread::sleep(Duration::from_millis(5));
            if ring.read_status() == RingStatus::Ready {
                // If a reader ever sees the record before the writer
                // flagged itself as done, the two-phase contract broke.
                assert!(published.load(Ordering::Acquire), "record visible before push2 published it");
            }
        }

        writer.join().unwrap();
        assert_eq!(ring.read_status(), RingStatus::Ready);
        let record = ring.shift().unwrap().expect("record was published");
        assert_eq!(record.payload, &[9u8; 8]);
        ring.shift2(record);
    }
}
