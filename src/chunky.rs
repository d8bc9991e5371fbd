//! The chunky splitter: wraps any [`Allocator`] and serves arbitrary-sized
//! requests by decomposing them into at most `k` power-of-two
//! sub-allocations routed through the wrapped allocator.
//!
//! Grounded on `original_source/chunky-generic.c` (the standalone wrapper
//! usable over any backend) and `chunky-mini.c` (a `k`-tuned variant over
//! mini specifically) — both are the same algorithm with a different
//! compile-time `CHUNKS_COUNT` and per-chunk overhead constant, unified
//! here into one generic `Splitter<A>` configured per instance (see the
//! `CHUNKS_COUNT` entry in `DESIGN.md`'s Open Question resolutions).
//!
//! Chunk 0 carries the [`BlobHeader`] inline, ahead of its own payload, in
//! the same underlying allocation — exactly as the C original's `blob`
//! pointer *is* the first sub-block, with `blob->size` and
//! `blob->other_chunks` occupying its first bytes. Chunks 1..k are pure
//! payload with no header of their own.

use crate::backend::Allocator;
use crate::size_class::{self, MAX_CHUNKS};
use std::ptr::NonNull;

#[repr(C)]
struct BlobHeader {
    size: usize,
    /// Addresses of chunks 1..k (chunk 0 is the header's own allocation).
    /// Stored as `usize` rather than raw pointers since unused trailing
    /// slots (when fewer than `MAX_CHUNKS - 1` chunks are in use) have no
    /// valid pointer value to hold.
    other_chunks: [usize; MAX_CHUNKS - 1],
}

const HEADER_SIZE: usize = std::mem::size_of::<BlobHeader>();

/// Wraps an underlying [`Allocator`] and serves arbitrary sizes by
/// decomposing each request into at most `k` power-of-two chunks.
pub struct Splitter<A: Allocator> {
    inner: A,
    k: usize,
    min_order: u32,
    max_order: u32,
    per_chunk_overhead: usize,
}

impl<A: Allocator> Splitter<A> {
    /// `per_chunk_overhead` is the conservative per-sub-allocation
    /// metadata allowance size_class.rs pads into the covered total once a
    /// request needs more than one chunk (e.g. a mini span's boundary tag,
    /// or a buddy block's header) — it should match whatever the wrapped
    /// allocator actually costs per allocation.
    pub fn new(inner: A, k: usize, min_order: u32, max_order: u32, per_chunk_overhead: usize) -> Self {
        assert!((1..=MAX_CHUNKS).contains(&k), "k out of range: {k}");
        Self {
            inner,
            k,
            min_order,
            max_order,
            per_chunk_overhead,
        }
    }

    fn decompose(&self, size: usize) -> [i32; MAX_CHUNKS] {
        size_class::decompose(
            size,
            self.min_order,
            self.max_order,
            HEADER_SIZE,
            self.per_chunk_overhead,
            self.k,
        )
    }

    fn chunk_count(orders: &[i32; MAX_CHUNKS]) -> usize {
        orders.iter().take_while(|&&o| o >= 0).count()
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: Allocator> Allocator for Splitter<A> {
    fn name(&self) -> &'static str {
        "chunky"
    }

    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        let orders = self.decompose(size);
        let n = Self::chunk_count(&orders);
        assert!(n >= 1, "decompose produced zero chunks for size {size}");

        let mut addrs = [0usize; MAX_CHUNKS];
        for i in 0..n {
            let chunk = self.inner.alloc(1usize << (orders[i] as u32));
            addrs[i] = chunk.as_ptr() as usize;
        }

        let header_ptr = addrs[0] as *mut BlobHeader;
        // SAFETY: addrs[0] came from `inner.alloc` of at least
        // `HEADER_SIZE + requested payload` bytes for chunk 0, per
        // `decompose`'s `blob_header_size` accounting.
        unsafe {
            (*header_ptr).size = size;
            let mut other = [0usize; MAX_CHUNKS - 1];
            other[..n - 1].copy_from_slice(&addrs[1..n]);
            (*header_ptr).other_chunks = other;
            NonNull::new_unchecked((header_ptr as *mut u8).add(HEADER_SIZE))
        }
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        let header_ptr = ptr.as_ptr().sub(HEADER_SIZE) as *mut BlobHeader;
        let header = &*header_ptr;
        debug_assert_eq!(header.size, size, "chunky free size mismatch");

        let orders = self.decompose(size);
        let n = Self::chunk_count(&orders);

        self.inner
            .free(NonNull::new_unchecked(header_ptr as *mut u8), 1usize << (orders[0] as u32));
        for i in 1..n {
            let addr = header.other_chunks[i - 1];
            self.inner
                .free(NonNull::new_unchecked(addr as *mut u8), 1usize << (orders[i] as u32));
        }
    }

    fn total_allocated_bytes(&self) -> u64 {
        self.inner.total_allocated_bytes()
    }

    fn iterate_chunks(&self, ptr: NonNull<u8>, size: usize, visit: &mut dyn FnMut(NonNull<u8>, usize)) {
        let orders = self.decompose(size);
        let n = Self::chunk_count(&orders);
        unsafe {
            let header_ptr = ptr.as_ptr().sub(HEADER_SIZE) as *mut BlobHeader;
            let header = &*header_ptr;
            visit(NonNull::new_unchecked(header_ptr as *mut u8), 1usize << (orders[0] as u32));
            for i in 1..n {
                let addr = header.other_chunks[i - 1];
                visit(NonNull::new_unchecked(addr as *mut u8), 1usize << (orders[i] as u32));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dl_backend::DlBackend;

    #[test]
    fn roundtrips_small_and_large_blobs() {
        let mut splitter = Splitter::new(DlBackend::new(), 4, 5, 25, 16);
        for size in [8usize, 200, 5_000, 500_000] {
            let ptr = splitter.alloc(size);
            unsafe {
                std::ptr::write_bytes(ptr.as_ptr(), 0xAB, size);
                for i in 0..size {
                    assert_eq!(*ptr.as_ptr().add(i), 0xAB);
                }
                splitter.free(ptr, size);
            }
        }
    }

    #[test]
    fn multi_chunk_blob_visits_every_sub_chunk() {
        let mut splitter = Splitter::new(DlBackend::new(), 4, 5, 12, 16);
        // Large enough relative to the small max_order to force multiple chunks.
        let size = 6_000;
        let ptr = splitter.alloc(size);
        let mut visited = 0usize;
        splitter.iterate_chunks(ptr, size, &mut |_p, _len| visited += 1);
        assert!(visited >= 2, "expected a multi-chunk decomposition, got {visited}");
        unsafe { splitter.free(ptr, size) };
    }
}
