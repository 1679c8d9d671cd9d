//! A `Debug`/`Display` wrapper that hides a value's contents in logs unless
//! the operator has explicitly opted into unredacted output.
//!
//! Object payloads and table row values can carry arbitrary application
//! data; tracing spans on the replication and transport paths wrap them in
//! [`Sensitive`] so a default `RUST_LOG=debug` session never leaks them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

static ALLOW_UNREDACTED: AtomicBool = AtomicBool::new(false);

/// Enable or disable printing of [`Sensitive`]-wrapped values in full.
///
/// Intended to be called once at startup from a config flag
/// (`--unredacted-logs`); never toggled per-request.
pub fn set_log_sensitive_data(allow: bool) {
    ALLOW_UNREDACTED.store(allow, Ordering::Relaxed);
}

fn unredacted_allowed() -> bool {
    ALLOW_UNREDACTED.load(Ordering::Relaxed)
}

/// Wraps a value so that its `Debug`/`Display` output is elided by default.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sensitive<T>(pub T);

impl<T> Sensitive<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if unredacted_allowed() {
            fmt::Debug::fmt(&self.0, f)
        } else {
            write!(f, "<redacted>")
        }
    }
}

impl<T: fmt::Display> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if unredacted_allowed() {
            fmt::Display::fmt(&self.0, f)
        } else {
            write!(f, "<redacted>")
        }
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Sensitive(value)
    }
}

/// Extension trait for wrapping any value in [`Sensitive`] with a fluent call.
pub trait Redact: Sized {
    /// Wrap `self` in [`Sensitive`].
    fn redacted(self) -> Sensitive<Self> {
        Sensitive(self)
    }
}

impl<T> Redact for T {}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases live in one test: the allow flag is a single process-global,
    // so two tests flipping it independently would race under the default
    // parallel test runner.
    #[test]
    fn redaction_follows_the_global_flag() {
        set_log_sensitive_data(false);
        assert_eq!(format!("{:?}", Sensitive("secret payload")), "<redacted>");
        assert_eq!(format!("{}", Sensitive("secret payload")), "<redacted>");

        set_log_sensitive_data(true);
        assert_eq!(format!("{:?}", Sensitive(42)), "42");

        set_log_sensitive_data(false);
    }
}
