//! Raises the process's open-file-descriptor limit at startup.
//!
//! A host holds one ring-buffer mapping per peer connection plus one per
//! local store file; on a busy cluster with a default 1024-descriptor soft
//! limit that is exhausted quickly. We raise the soft limit to the hard
//! limit (never past it) rather than failing fast on connect.

#[cfg(unix)]
/// Raise the process's soft `RLIMIT_NOFILE` to its hard limit, if the soft
/// limit is currently lower. Returns the resulting soft limit. A failure to
/// read or write the limit is logged and treated as non-fatal: the process
/// keeps running with whatever limit it already had.
pub fn maybe_increase_nofile_limit() -> u64 {
    use std::mem::MaybeUninit;

    let mut limits = MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: `limits` is only read after `getrlimit` reports success, which
    // guarantees it initialized every field.
    let current = unsafe {
        if libc::getrlimit(libc::RLIMIT_NOFILE, limits.as_mut_ptr()) != 0 {
            tracing::warn!(
                error = %std::io::Error::last_os_error(),
                "failed to read RLIMIT_NOFILE, leaving it unchanged"
            );
            return 0;
        }
        limits.assume_init()
    };

    if current.rlim_cur >= current.rlim_max {
        return current.rlim_cur;
    }

    let raised = libc::rlimit {
        rlim_cur: current.rlim_max,
        rlim_max: current.rlim_max,
    };

    // SAFETY: `raised` is a fully initialized `rlimit` with `rlim_cur` no
    // greater than `rlim_max`, which is the one precondition `setrlimit`
    // documents.
    let ok = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &raised) == 0 };
    if !ok {
        tracing::warn!(
            error = %std::io::Error::last_os_error(),
            requested = raised.rlim_cur,
            "failed to raise RLIMIT_NOFILE, leaving it unchanged"
        );
        return current.rlim_cur;
    }

    tracing::debug!(from = current.rlim_cur, to = raised.rlim_cur, "raised RLIMIT_NOFILE");
    raised.rlim_cur
}

#[cfg(not(unix))]
/// No-op on non-Unix targets; there is no `rlimit` concept to raise.
pub fn maybe_increase_nofile_limit() -> u64 {
    0
}
