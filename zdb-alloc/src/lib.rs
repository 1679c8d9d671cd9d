//! Wires up jemalloc as the process-wide global allocator and exposes the
//! heap profiling controls used by the `/debug/pprof/heap` admin endpoint.
//!
//! Every binary crate in the workspace pulls this crate in purely for its
//! `#[global_allocator]` side effect; nothing else needs to reference it
//! directly except the admin server, which calls [`dump_profile`].

pub mod error;

#[cfg(not(feature = "sys-malloc"))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use error::{ProfError, ProfResult};

/// A snapshot of jemalloc's global byte counters, refreshed on each call.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocStats {
    /// Bytes allocated by the application, not including allocator bookkeeping.
    pub allocated: u64,
    /// Bytes in physically resident pages mapped by the allocator.
    pub resident: u64,
}

/// Read jemalloc's allocated/resident counters. Requires calling
/// `jemalloc_ctl::epoch::advance()` first to refresh the cached stats;
/// failures to do so come back as [`ProfError::JemallocError`].
pub fn fetch_stats() -> ProfResult<AllocStats> {
    tikv_jemalloc_ctl::epoch::advance().map_err(|e| ProfError::JemallocError(e.to_string()))?;
    let allocated = tikv_jemalloc_ctl::stats::allocated::read()
        .map_err(|e| ProfError::JemallocError(e.to_string()))?;
    let resident = tikv_jemalloc_ctl::stats::resident::read()
        .map_err(|e| ProfError::JemallocError(e.to_string()))?;
    Ok(AllocStats {
        allocated: allocated as u64,
        resident: resident as u64,
    })
}

/// Dump a jemalloc heap profile to a temp file and return its contents.
/// Returns [`ProfError::MemProfilingNotEnabled`] if the binary was built
/// without the `mem-profiling` feature or `MALLOC_CONF` did not request
/// profiling at process start.
#[cfg(feature = "mem-profiling")]
pub fn dump_profile() -> ProfResult<Vec<u8>> {
    use std::ffi::CString;
    use std::io::Read;

    const PROF_ACTIVE: &[u8] = b"prof.active\0";
    const PROF_DUMP: &[u8] = b"prof.dump\0";

    let active: bool = tikv_jemalloc_ctl::raw::read(PROF_ACTIVE)
        .map_err(|e| ProfError::JemallocError(e.to_string()))?;
    if !active {
        return Err(ProfError::MemProfilingNotEnabled);
    }

    let mut tmp = tempfile::NamedTempFile::new()?;
    let path = tmp
        .path()
        .to_str()
        .ok_or_else(|| ProfError::PathEncodingError(tmp.path().as_os_str().to_owned()))?;
    let c_path = CString::new(path)?;

    // SAFETY: `c_path` is a NUL-terminated path jemalloc will write a
    // complete profile dump to before `raw::write` returns.
    unsafe {
        tikv_jemalloc_ctl::raw::write(PROF_DUMP, c_path.as_ptr())
            .map_err(|e| ProfError::JemallocError(e.to_string()))?;
    }

    let mut buf = Vec::new();
    tmp.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(not(feature = "mem-profiling"))]
/// Heap profiling was not compiled in; always returns
/// [`ProfError::MemProfilingNotEnabled`].
pub fn dump_profile() -> ProfResult<Vec<u8>> {
    Err(ProfError::MemProfilingNotEnabled)
}

#[cfg(all(test, feature = "mem-profiling"))]
mod tests {
    use super::*;

    #[test]
    fn dump_without_active_profiling_is_reported_not_fatal() {
        match dump_profile() {
            Err(ProfError::MemProfilingNotEnabled) | Err(ProfError::JemallocError(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => {}
        }
    }

    #[test]
    fn fetch_stats_succeeds() {
        let stats = fetch_stats().expect("jemalloc stats should be readable");
        assert!(stats.resident >= stats.allocated || stats.resident == 0);
    }
}
