//! The "je" backend: jemalloc reached through `tikv-jemallocator`,
//! mirroring `original_source/jemalloc-adaptor.c`'s thin wrapper around
//! the system jemalloc. Unix-only, matching the crate's own platform
//! support.
//!
//! `jemalloc-adaptor.c` disables jemalloc's thread cache once
//! (`mallctl("thread.tcache.enabled", ...)`) so its `stats.active` reads
//! reflect actual arena activity rather than cached-but-unreturned
//! blocks, then reports OS-visible bytes by reading `stats.active`
//! directly — a real mallctl call, not a counter this adapter maintains
//! itself (unlike the `dl`/`mini` backends, jemalloc can answer "how many
//! bytes do you actually hold" on its own). `tikv-jemalloc-ctl` exposes
//! the same control interface as typed Rust calls instead of raw
//! `mallctl` byte buffers.

use crate::backend::Allocator;
use std::alloc::{GlobalAlloc, Layout};
use std::ptr::NonNull;
use tikv_jemalloc_ctl::{epoch, stats, Access};
use tikv_jemallocator::Jemalloc;

const ALIGN: usize = 8;

pub struct JeBackend {
    alloc: Jemalloc,
    tcache_disabled: bool,
}

impl JeBackend {
    pub fn new() -> Self {
        Self {
            alloc: Jemalloc,
            tcache_disabled: false,
        }
    }

    /// Mirrors `jemalloc-adaptor.c`'s `maybe_init`/`do_init`: disable the
    /// calling thread's tcache once, so `stats.active` isn't skewed by
    /// blocks jemalloc is holding in a per-thread cache rather than an
    /// arena. Best-effort — a control-interface failure here isn't fatal
    /// the way an allocation failure is.
    fn ensure_tcache_disabled(&mut self) {
        if self.tcache_disabled {
            return;
        }
        if let Ok(ctl) = tikv_jemalloc_ctl::thread::tcache::enabled::mib() {
            let _ = ctl.write(false);
        }
        self.tcache_disabled = true;
    }
}

impl Default for JeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for JeBackend {
    fn name(&self) -> &'static str {
        "je"
    }

    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        self.ensure_tcache_disabled();
        let layout = Layout::from_size_align(size, ALIGN).expect("valid layout");
        // SAFETY: layout is non-zero sized for every call site in this crate.
        let ptr = unsafe { self.alloc.alloc(layout) };
        NonNull::new(ptr).unwrap_or_else(|| panic!("je: out of memory allocating {size} bytes"))
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        let layout = Layout::from_size_align_unchecked(size, ALIGN);
        self.alloc.dealloc(ptr.as_ptr(), layout);
    }

    fn total_allocated_bytes(&self) -> u64 {
        // Refresh the stats epoch before reading, or `stats.active` would
        // answer with a stale snapshot from the last refresh.
        if let Ok(e) = epoch::mib() {
            let _ = e.advance();
        }
        stats::active::mib()
            .and_then(|mib| mib.read())
            .unwrap_or(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_roundtrip() {
        let mut b = JeBackend::new();
        let ptr = b.alloc(256);
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x42, 256);
            b.free(ptr, 256);
        }
        assert!(b.total_allocated_bytes() > 0, "jemalloc should report nonzero active bytes after allocating");
    }
}
