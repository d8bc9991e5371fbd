//! The uniform backend interface every allocator in this workbench
//! implements, plus the four concrete backends the driver can select
//! between with `-t`.
//!
//! Grounded on `original_source/common.h`'s `allocation_functions` vtable
//! (`{alloc, free, get_total_allocated_size}`); `iterate_chunks` is the
//! Rust equivalent of that struct's optional `iterate_chunks` function
//! pointer, which several backends (mini, dl, je) leave null — here that's
//! a default trait method instead of an `Option<fn(..)>` field.

pub mod buddy_backend;
pub mod dl_backend;
#[cfg(unix)]
pub mod je_backend;
pub mod mini_backend;

use std::ptr::NonNull;

/// A byte-addressable allocator exposing exactly the surface the driver
/// needs to run a workload against it, independent of what's underneath.
pub trait Allocator {
    /// Short identifier used in CLI selection and reports (`"buddy"`,
    /// `"mini"`, `"dl"`, `"je"`).
    fn name(&self) -> &'static str;

    /// Allocate at least `size` usable bytes.
    fn alloc(&mut self, size: usize) -> NonNull<u8>;

    /// Release an allocation previously returned by [`Self::alloc`] with
    /// the same `size`.
    ///
    /// # Safety
    /// `ptr` must be a live allocation from this allocator made with this
    /// exact `size`, not already freed.
    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize);

    /// Bytes this backend has acquired from the OS (or its underlying
    /// allocator) so far — not bytes currently held by the application.
    fn total_allocated_bytes(&self) -> u64;

    /// Visit the physical sub-chunks backing a single logical allocation,
    /// for backends that fragment one request across several underlying
    /// blocks (buddy, chunky). Backends that hand back one contiguous
    /// region per allocation (mini, dl, je) use the default no-op, mirroring
    /// the C original leaving `iterate_chunks` null in those vtables.
    fn iterate_chunks(&self, _ptr: NonNull<u8>, _size: usize, _visit: &mut dyn FnMut(NonNull<u8>, usize)) {}
}

/// Lets a boxed trait object stand in for a concrete backend, so the CLI's
/// `-c` flag can wrap whichever backend `-t` selected in a
/// [`crate::chunky::Splitter`] without a match arm per backend type.
impl Allocator for Box<dyn Allocator> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn alloc(&mut self, size: usize) -> NonNull<u8> {
        (**self).alloc(size)
    }

    unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize) {
        (**self).free(ptr, size)
    }

    fn total_allocated_bytes(&self) -> u64 {
        (**self).total_allocated_bytes()
    }

    fn iterate_chunks(&self, ptr: NonNull<u8>, size: usize, visit: &mut dyn FnMut(NonNull<u8>, usize)) {
        (**self).iterate_chunks(ptr, size, visit)
    }
}
