//! The "mini" backend: the boundary-tag allocator exposed through the
//! uniform [`Allocator`] interface, mirroring
//! `original_source/mini-adaptor.c`.

use crate::backend::Allocator;
use crate::mini::Mini;
use std::ptr::NonNull;

pub struct MiniBackend {
    inner: Mini,
}

impl MiniBackend {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            inner: Mini::new(chunk_size),
        }
    }

    /// Exposes [`Mini::realloc`] through the backend the way `-adaptor.c`
    /// files expose their allocator's full vtable rather than just the
    /// subset `driver/` happens to call; panics on failure to match
    /// [`Allocator::alloc`]'s own failure contract.
    ///
    /// # Safety
    /// `ptr` must be a live allocation from this backend made with at
    /// least `old_size` usable bytes, not already freed.
    pub unsafe fn realloc(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8> {
        self.inner
            .realloc(ptr, old_size, new_size)
            .unwrap_or_else(|e| panic!("mini: {e}"))
    }
}

impl Allocator for MiniBackend {
    fn name(&self) -> &'static str {
        "mini"
    }

    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        self.inner
            .alloc(size)
            .unwrap_or_else(|e| panic!("mini: {e}"))
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, _size: usize) {
        self.inner.free(ptr)
    }

    fn total_allocated_bytes(&self) -> u64 {
        self.inner.total_allocated_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_roundtrip() {
        let mut b = MiniBackend::new(64 * 1024);
        let ptr = b.alloc(256);
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x7, 256);
            b.free(ptr, 256);
        }
    }

    #[test]
    fn realloc_preserves_payload_bytes() {
        let mut b = MiniBackend::new(64 * 1024);
        let ptr = b.alloc(128);
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0x42, 128);
            let grown = b.realloc(ptr, 128, 1024);
            let bytes = std::slice::from_raw_parts(grown.as_ptr(), 128);
            assert!(bytes.iter().all(|&byte| byte == 0x42));
            b.free(grown, 1024);
        }
    }
}
