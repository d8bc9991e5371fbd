//! A narrow `sbrk`-like abstraction for acquiring aligned regions of memory
//! from the operating system.
//!
//! The spec treats OS memory acquisition as an external collaborator: "a
//! byte-region grant function yielding properly-aligned regions and never
//! returning them" (§5). This module is that function, implemented on top
//! of `std::alloc` rather than a raw `sbrk`/`mmap` syscall, since a userspace
//! benchmark has no business calling `sbrk` directly when the allocation
//! it wants is just "give me `size` bytes aligned to `align`".
//!
//! Regions granted here are never released; see §5 (no release by design).

use std::alloc::{self, Layout};
use std::ptr::NonNull;

displaydoc_lite::displaydoc! {
    /// Failure to obtain memory from the operating system.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// the OS refused to grant a region of {0} bytes aligned to {1}
        OutOfMemory(usize, usize),
        /// requested alignment {0} is not a power of two
        BadAlignment(usize),
    }
}

/// Request a region of `size` bytes from the OS, aligned to `align`.
///
/// Returns [`Error::OutOfMemory`] on allocation failure rather than
/// aborting — callers decide whether that failure is recoverable (mini) or
/// fatal (buddy, chunky), per the spec's per-backend failure model.
pub fn grant(size: usize, align: usize) -> Result<NonNull<u8>, Error> {
    let layout = Layout::from_size_align(size, align).map_err(|_| Error::BadAlignment(align))?;
    // SAFETY: `layout` is non-zero sized for every caller in this crate
    // (buddy requests at least `1 << MIN_ORDER` bytes, mini at least
    // `CHUNK_SIZE`), satisfying `alloc`'s preconditions.
    let ptr = unsafe { alloc::alloc(layout) };
    NonNull::new(ptr).ok_or(Error::OutOfMemory(size, align))
}

/// Best-effort resident-set-size readback, grounded on `main.c`'s
/// `rss_allocated` (`/proc/self/statm`'s second field, in pages). Unlike
/// the C original, a read failure here returns `None` rather than
/// aborting — RSS is a diagnostic the driver prints alongside its stats
/// report, never an input to a waste calculation (`SPEC_FULL.md` §1).
#[cfg(target_os = "linux")]
pub fn rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

#[cfg(not(target_os = "linux"))]
pub fn rss_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_aligned_region() {
        let ptr = grant(4096, 4096).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 4096, 0);
    }

    #[test]
    fn rejects_bad_alignment() {
        assert_eq!(grant(64, 3), Err(Error::BadAlignment(3)));
    }
}
