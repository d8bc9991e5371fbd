//! The "dl" backend: a genuinely external, opaque allocator reached
//! through a thin adapter, mirroring `original_source/dl-adaptor.c`'s
//! wrapping of dlmalloc behind the shared `allocation_functions` vtable.
//! dlmalloc itself is out of scope here — it's a real third-party crate,
//! not reimplemented.
//!
//! `dl-adaptor.c`'s `dl_total_allocated` is incremented in `dl_alloc` and
//! *decremented* in `dl_free` — it tracks current bytes in use, not a
//! monotonic OS-grant total, because dlmalloc gives no way to observe the
//! real underlying OS grant. `granted` here mirrors that exactly.

use crate::backend::Allocator;
use dlmalloc::Dlmalloc;
use std::ptr::NonNull;

const ALIGN: usize = 8;

pub struct DlBackend {
    inner: Dlmalloc,
    granted: u64,
}

impl DlBackend {
    pub fn new() -> Self {
        Self {
            inner: Dlmalloc::new(),
            granted: 0,
        }
    }
}

impl Default for DlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for DlBackend {
    fn name(&self) -> &'static str {
        "dl"
    }

    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        // SAFETY: size is nonzero for every call site in this crate.
        let ptr = unsafe { self.inner.malloc(size, ALIGN) };
        let ptr = NonNull::new(ptr).unwrap_or_else(|| panic!("dl: out of memory allocating {size} bytes"));
        self.granted += size as u64;
        ptr
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        self.inner.free(ptr.as_ptr(), size, ALIGN);
        self.granted -= size as u64;
    }

    fn total_allocated_bytes(&self) -> u64 {
        self.granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_roundtrip() {
        let mut b = DlBackend::new();
        let ptr = b.alloc(256);
        assert_eq!(b.total_allocated_bytes(), 256);
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x42, 256);
            b.free(ptr, 256);
        }
        assert_eq!(b.total_allocated_bytes(), 0, "free should decrement bytes-in-use");
    }
}
