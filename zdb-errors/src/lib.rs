//! Error types shared by every crate in the workspace.
//!
//! The error kinds mirror §7 of the design: a handful of named kinds that
//! the caller is expected to branch on (is this fatal? is this retryable?),
//! plus an `Internal` catch-all for invariant violations that should never
//! happen and are not meant to be handled, only logged and escalated.

/// The result type returned by fallible operations across the `zdb-*` crates.
pub type Result<T> = std::result::Result<T, Error>;

/// A kind-tagged error, per §7 ERROR HANDLING DESIGN.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Refuses to start; always logged Fatal by the caller.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Listener accept, connect, or store-open failure. Retried by the
    /// caller at its own `reconnect_freq`.
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    /// A malformed frame or out-of-protocol message from a peer. The caller
    /// drops the frame and disconnects the peer; never fatal to the process.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A store-level write failed. Fatal to a leader: it deactivates and the
    /// cluster re-elects.
    #[error("commit failed: {0}")]
    CommitFailure(String),

    /// Election ranking tied with no well-defined leader. Logged Fatal; the
    /// host stays Electing until a heartbeat breaks the tie.
    #[error("election deadlock: {0}")]
    ElectionDeadlock(String),

    /// UN/SN arithmetic overflow. Surfaced to higher layers as `NotReady`,
    /// never as a crash.
    #[error("sequence number out of range")]
    OutOfRange,

    /// An invariant that should be impossible to violate was violated.
    /// Reaching this is always a bug; never matched on by calling code.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// True for error kinds that threaten a global invariant (SN
    /// monotonicity, commit durability) and therefore always escalate to
    /// failover, per §7's policy line. Connection-local kinds return false.
    pub fn is_failover_trigger(&self) -> bool {
        matches!(
            self,
            Error::CommitFailure(_) | Error::ElectionDeadlock(_) | Error::Internal(_)
        )
    }
}

/// Helper for constructing an [`Error::Internal`] with a formatted message,
/// mirroring the teacher's `internal!`/`internal_err!` macro pair.
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {
        $crate::Error::Internal(format!($($arg)*))
    };
}

/// Returns an [`Error::Internal`] from the enclosing function.
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => {
        return ::std::result::Result::Err($crate::internal_err!($($arg)*))
    };
}

/// Asserts a condition, returning [`Error::Internal`] instead of panicking
/// if it does not hold. Use at invariant boundaries that must never trip in
/// correct code, but where a caller-facing `Result` is preferable to a
/// panic (e.g. in code reachable from a remote peer's malformed input).
#[macro_export]
macro_rules! invariant {
    ($cond:expr) => {
        if !$cond {
            $crate::internal!("invariant violated: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::internal!($($arg)*);
        }
    };
}

/// Like [`invariant`], but compares two values and includes both in the
/// error message on mismatch.
#[macro_export]
macro_rules! invariant_eq {
    ($left:expr, $right:expr) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val != *right_val {
                    $crate::internal!(
                        "invariant violated: {} == {} ({:?} != {:?})",
                        stringify!($left),
                        stringify!($right),
                        left_val,
                        right_val
                    );
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failover_trigger_classification() {
        assert!(!Error::Configuration("x".into()).is_failover_trigger());
        assert!(!Error::Protocol("x".into()).is_failover_trigger());
        assert!(Error::CommitFailure("x".into()).is_failover_trigger());
        assert!(Error::ElectionDeadlock("x".into()).is_failover_trigger());
    }

    fn check(n: i32) -> Result<()> {
        invariant!(n >= 0, "n must be non-negative, got {n}");
        Ok(())
    }

    #[test]
    fn invariant_macro() {
        assert!(check(1).is_ok());
        assert!(matches!(check(-1), Err(Error::Internal(_))));
    }
}
