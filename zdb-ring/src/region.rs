//! The byte region a ring's records live in.
//!
//! Two flavors, matching §4.1 ADD:
//!
//! - [`Region::Heap`] — a plain `Box<[u8]>`, used for in-process rings.
//!   There is only one process involved, so instead of mirrored mapping we
//!   simply refuse to let a record straddle the end of the buffer: when the
//!   remaining contiguous space is too small, the writer plants a skip
//!   marker and wraps to offset zero, at the cost of a little wasted space.
//! - [`Region::Mirrored`] — an anonymous `memfd` mapped twice back to back
//!   via raw `mmap`, so any offset in `0..2*capacity` is valid and a record
//!   that logically wraps still reads back as one contiguous slice. This is
//!   the IPC-sharing path; `memmap2::MmapMut` doesn't expose a fixed-address
//!   mapping API, so the double map itself is built with two raw `mmap`
//!   calls over a reservation, matching the pattern in the shared-memory
//!   ring implementations this crate is grounded on.

use std::fs::File;
use std::os::fd::FromRawFd;
use std::ptr::NonNull;

use crate::error::{Result, RingError};

/// The backing byte region for a ring's records, sized to a power-of-two
/// `capacity` in bytes.
///
/// Access is through raw pointers derived from `&self`, not `&mut self`:
/// a ring's whole point is that a writer and its readers touch the same
/// bytes concurrently from different threads (possibly different
/// processes), with the `ControlBlock` atomics — not Rust's borrow checker
/// — the thing that actually prevents a reader from observing a writer's
/// in-progress record. `Ring` upholds that contract; this type only owns
/// the memory.
pub enum Region {
    /// In-process region; valid offsets are `0..capacity`.
    Heap(HeapRegion),
    /// Doubly-mapped shared region; valid offsets are `0..2*capacity`, with
    /// `capacity..2*capacity` mirroring `0..capacity`.
    Mirrored(MirroredRegion),
}

impl Region {
    /// Allocate a heap-backed, in-process region.
    pub fn heap(capacity: u32) -> Region {
        Region::Heap(HeapRegion::new(capacity))
    }

    /// Allocate a doubly-mapped, shareable region backed by an anonymous
    /// `memfd`.
    pub fn mirrored(capacity: u32) -> Result<Region> {
        MirroredRegion::new(capacity).map(Region::Mirrored)
    }

    /// True if this region supports offsets past `capacity` (i.e. genuine
    /// wraparound without a skip marker).
    pub fn supports_wraparound(&self) -> bool {
        matches!(self, Region::Mirrored(_))
    }

    /// Total addressable bytes for record placement (the ring's logical
    /// size, not the doubled physical mapping size for `Mirrored`).
    pub fn capacity(&self) -> u32 {
        match self {
            Region::Heap(h) => h.capacity,
            Region::Mirrored(m) => m.capacity,
        }
    }

    /// Borrow `len` bytes starting at `offset`. For `Mirrored` regions,
    /// `offset + len` may exceed `capacity` (it reads into the mirror);
    /// for `Heap` regions it must not.
    ///
    /// # Safety
    /// The caller (`Ring`) must ensure no other thread holds a conflicting
    /// borrow of the same byte range: the `ControlBlock` cursors are the
    /// synchronization, not this method.
    pub unsafe fn slice(&self, offset: u32, len: u32) -> &[u8] {
        let base = self.as_ptr();
        // SAFETY: delegated to the caller's contract, documented above.
        unsafe { std::slice::from_raw_parts(base.add(offset as usize), len as usize) }
    }

    /// Mutably borrow `len` bytes starting at `offset`. Same offset and
    /// synchronization contract as [`Region::slice`].
    ///
    /// # Safety
    /// See [`Region::slice`].
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, offset: u32, len: u32) -> &mut [u8] {
        let base = self.as_ptr().cast_mut();
        // SAFETY: delegated to the caller's contract, documented above.
        unsafe { std::slice::from_raw_parts_mut(base.add(offset as usize), len as usize) }
    }

    fn as_ptr(&self) -> *const u8 {
        match self {
            Region::Heap(h) => h.ptr.as_ptr().cast_const(),
            Region::Mirrored(m) => m.ptr.as_ptr().cast_const(),
        }
    }
}

/// A heap-allocated region whose bytes are reachable through a raw pointer
/// from a shared reference, so concurrent readers/writer can access it the
/// same way they would a `Mirrored` region.
pub struct HeapRegion {
    ptr: NonNull<u8>,
    capacity: u32,
}

// SAFETY: synchronization is via `ControlBlock`'s atomics, the same
// contract as `MirroredRegion`.
unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    fn new(capacity: u32) -> HeapRegion {
        let boxed = vec![0u8; capacity as usize].into_boxed_slice();
        let ptr = NonNull::new(Box::into_raw(boxed).cast::<u8>()).expect("Box is never null");
        HeapRegion { ptr, capacity }
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` was produced by `Box::into_raw` over a
        // `[u8]` of length `self.capacity` in `new`, and is not freed
        // anywhere else.
        unsafe {
            drop(Box::from_raw(std::slice::from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.capacity as usize,
            )));
        }
    }
}

/// A `memfd`-backed region mapped twice, contiguously, into this process's
/// address space.
pub struct MirroredRegion {
    ptr: NonNull<u8>,
    capacity: u32,
    // Kept alive only to hold the fd open for the lifetime of the mapping;
    // the mapping itself does not need further syscalls against it.
    _file: File,
}

// SAFETY: the mapping is fixed for the lifetime of `MirroredRegion` and
// access is synchronized by the ring's atomics, the same contract a raw
// `*mut u8` shared-memory region always has.
unsafe impl Send for MirroredRegion {}
unsafe impl Sync for MirroredRegion {}

impl MirroredRegion {
    fn new(capacity: u32) -> Result<MirroredRegion> {
        let cap = capacity as usize;

        // SAFETY: `memfd_create` is called with a static, valid C string
        // and returns either a valid owned fd or -1.
        let fd = unsafe { libc::memfd_create(c"zdb-ring".as_ptr(), 0) };
        if fd < 0 {
            return Err(RingError::MirrorMapping(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by `memfd_create` and is not yet
        // owned elsewhere.
        let file = unsafe { File::from_raw_fd(fd) };

        // SAFETY: `fd` is valid and `cap` fits in `off_t` for any
        // realistic ring size.
        if unsafe { libc::ftruncate(fd, cap as libc::off_t) } != 0 {
            return Err(RingError::MirrorMapping(std::io::Error::last_os_error()));
        }

        // Reserve 2*cap of address space so the two fixed mappings below
        // cannot collide with anything else, then overwrite it in two
        // halves with MAP_FIXED mappings of the same file.
        //
        // SAFETY: all arguments are valid for an anonymous, non-fixed
        // reservation mapping of `2 * cap` bytes.
        let reservation = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                2 * cap,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if reservation == libc::MAP_FAILED {
            return Err(RingError::MirrorMapping(std::io::Error::last_os_error()));
        }

        // SAFETY: `reservation` is a `2*cap`-byte region owned by this
        // process that nothing else has mapped into yet; overwriting its
        // first half with a fixed mapping of `fd` is exactly what
        // `MAP_FIXED` is for.
        let first = unsafe {
            libc::mmap(
                reservation,
                cap,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            )
        };
        if first == libc::MAP_FAILED {
            // SAFETY: `reservation` was returned by the mmap call above with
            // length `2 * cap`.
            unsafe {
                libc::munmap(reservation, 2 * cap);
            }
            return Err(RingError::MirrorMapping(std::io::Error::last_os_error()));
        }

        // SAFETY: same reasoning as `first`, for the second half of the
        // reservation, completing the mirrored double-mapping.
        let second = unsafe {
            libc::mmap(
                reservation.add(cap),
                cap,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            )
        };
        if second == libc::MAP_FAILED {
            // SAFETY: `reservation` was returned by the mmap call above
            // with length `2 * cap`.
            unsafe {
                libc::munmap(reservation, 2 * cap);
            }
            return Err(RingError::MirrorMapping(std::io::Error::last_os_error()));
        }

        let ptr = NonNull::new(reservation.cast::<u8>()).expect("mmap never returns null on success");
        Ok(MirroredRegion { ptr, capacity, _file: file })
    }
}

impl Drop for MirroredRegion {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` is the base of a `2 * capacity`-byte mapping
        // created in `new` and not unmapped anywhere else.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), 2 * self.capacity as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_region_round_trips_a_write() {
        let region = Region::heap(4096);
        unsafe {
            region.slice_mut(100, 4).copy_from_slice(b"abcd");
            assert_eq!(region.slice(100, 4), b"abcd");
        }
    }

    #[test]
    fn mirrored_region_reads_across_the_wrap_as_one_span() {
        let region = Region::mirrored(4096).expect("mmap should succeed in test environment");
        let tail_len = 10u32;
        let start_offset = region.capacity() - tail_len;
        unsafe {
            region.slice_mut(start_offset, tail_len + 6).copy_from_slice(b"0123456789abcdef");
            // The wrapped-around prefix (offset 0..6) must show the same bytes
            // as what we see through the mirror at capacity..capacity+6.
            assert_eq!(region.slice(0, 6), &b"abcdef"[..]);
            assert_eq!(region.slice(start_offset, 16), &b"0123456789abcdef"[..]);
        }
    }
}
