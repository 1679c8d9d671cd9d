//! Cache-line padding for hot atomics that are written from different
//! threads, to avoid false sharing between a ring's write cursor and its
//! read cursor(s).

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Most x86-64 and aarch64 parts use a 64-byte cache line; a few aarch64
/// server parts use 128. We pad to the larger figure rather than detect it,
/// since over-padding only costs memory, while under-padding costs
/// correctness.
pub const CACHE_LINE_SIZE: usize = 128;

/// Wraps `T`, forcing it onto its own cache line.
///
/// Used for the control-block fields in a ring buffer (the write cursor, the
/// per-reader read cursors) so that a writer spinning on its own cursor
/// never bounces a cache line that a reader is also touching.
#[repr(align(128))]
#[derive(Default)]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    /// Wrap `value`, placing it at the start of its own cache line.
    pub const fn new(value: T) -> Self {
        CachePadded { value }
    }

    /// Unwrap, discarding the padding.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePadded").field("value", &self.value).finish()
    }
}

impl<T> From<T> for CachePadded<T> {
    fn from(value: T) -> Self {
        CachePadded::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn alignment_is_a_full_cache_line() {
        assert_eq!(std::mem::align_of::<CachePadded<AtomicU64>>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn deref_reaches_the_inner_value() {
        let padded = CachePadded::new(AtomicU64::new(7));
        assert_eq!(padded.load(std::sync::atomic::Ordering::Relaxed), 7);
    }
}
