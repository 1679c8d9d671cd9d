//! Spin-then-park blocking, the portable stand-in for the source's
//! spin-then-futex wait on a cursor word.
//!
//! A thread that needs to wait for a cursor to change first spins for a
//! configurable number of iterations (cheap, avoids a syscall for the
//! common case where the other side is already almost there), then falls
//! back to parking on a `Condvar` until woken or a timeout elapses.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, RingError};

/// Parameters controlling how long a blocked push/shift spins before
/// parking, and how long it parks before giving up.
#[derive(Debug, Clone, Copy)]
pub struct BlockerParams {
    /// Busy-spin iterations attempted before parking. Zero disables
    /// spinning and parks immediately.
    pub spin: u32,
    /// Upper bound on how long a single `wait` call may block once parked.
    /// `Duration::MAX` waits indefinitely.
    pub timeout: Duration,
}

impl Default for BlockerParams {
    fn default() -> Self {
        BlockerParams { spin: 1000, timeout: Duration::MAX }
    }
}

/// A condition variable paired with a mutex used purely to park/wake
/// threads; the actual state lives in the caller's atomic cursor, not in
/// the mutex.
pub struct Blocker {
    params: BlockerParams,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Blocker {
    /// Construct a blocker with the given spin/timeout parameters.
    pub fn new(params: BlockerParams) -> Blocker {
        Blocker { params, mutex: Mutex::new(()), condvar: Condvar::new() }
    }

    /// Spin, then park, until `ready` returns true of the current value of
    /// `cursor`, or the timeout elapses.
    ///
    /// `ready` is re-evaluated after every spin iteration and every wake;
    /// callers do not need their own retry loop.
    pub fn wait(&self, cursor: &AtomicU32, ready: impl Fn(u32) -> bool) -> Result<u32> {
        let deadline = match self.params.timeout {
            Duration::MAX => None,
            timeout => Some(Instant::now() + timeout),
        };

        for _ in 0..self.params.spin {
            let value = cursor.load(Ordering::Acquire);
            if ready(value) {
                return Ok(value);
            }
            std::hint::spin_loop();
        }

        loop {
            let value = cursor.load(Ordering::Acquire);
            if ready(value) {
                return Ok(value);
            }

            let mut guard = self.mutex.lock();
            // Re-check after taking the lock: the waker may have fired
            // between the load above and the lock acquisition.
            let value = cursor.load(Ordering::Acquire);
            if ready(value) {
                return Ok(value);
            }

            let timed_out = match deadline {
                None => {
                    self.condvar.wait(&mut guard);
                    false
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        true
                    } else {
                        self.condvar.wait_for(&mut guard, deadline - now).timed_out()
                    }
                }
            };

            if timed_out {
                let value = cursor.load(Ordering::Acquire);
                return if ready(value) { Ok(value) } else { Err(RingError::TimedOut) };
            }
        }
    }

    /// Wake every thread parked on this blocker. Cheap no-op if nobody is
    /// parked (the common case in a low-latency spin-dominated workload).
    pub fn wake_all(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}
