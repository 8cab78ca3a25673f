// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The `RegionSource` seam: where a [`crate::map::Map`] gets the backing
//! memory for each generation's header-plus-slot-array allocation.
//!
//! The map itself has no opinion on how memory is obtained. Production
//! callers on Unix plug in `chash-region`'s `mmap`-backed source; tests and
//! `no_std`-without-`alloc` embedders can supply their own. This crate ships
//! one default implementation, [`AllocRegion`], built on the global Rust
//! allocator, gated behind the `alloc` feature.

use core::ptr::NonNull;

/// A source of page- or allocator-granularity memory regions.
///
/// A generation's storage is requested once, at creation time, and never
/// resized in place: growth always allocates a brand new region for the new
/// generation. Implementations are free to round `bytes` up (e.g. to a page
/// size); callers only rely on the returned size being `>= bytes`.
///
/// # Safety
///
/// `free` must only be called with a pointer and size previously returned
/// together by `alloc` on the same `RegionSource`, and only once per
/// allocation.
pub unsafe trait RegionSource {
    /// Requests a zeroed region of at least `bytes` bytes, aligned to
    /// `align`. Returns `None` on allocation failure.
    fn alloc(&self, bytes: usize, align: usize) -> Option<(NonNull<u8>, usize)>;

    /// Releases a region previously returned by `alloc`.
    ///
    /// # Safety
    ///
    /// See the trait-level safety note.
    unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize, align: usize);
}

#[cfg(feature = "alloc")]
mod alloc_region {
    use super::RegionSource;
    use alloc::alloc::{alloc_zeroed, dealloc, handle_alloc_error};
    use core::alloc::Layout;
    use core::ptr::NonNull;

    /// A [`RegionSource`] backed by the global allocator.
    ///
    /// This is the default used by [`crate::map::Map::init`] when no region
    /// source is supplied, and the only one available without a platform
    /// crate such as `chash-region`. It has no notion of pages, so growth
    /// does not benefit from `mmap`'s lazy physical-page commit, but it is
    /// enough to run the map (and its bolero/loom tests) anywhere `alloc`
    /// is available.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct AllocRegion;

    // SAFETY: `free` is only ever called by `Map`/`Generation` with the
    // exact (ptr, bytes, align) triple returned by a prior `alloc` call, and
    // each allocation is freed exactly once (see `Generation::drop`).
    unsafe impl RegionSource for AllocRegion {
        fn alloc(&self, bytes: usize, align: usize) -> Option<(NonNull<u8>, usize)> {
            let layout = Layout::from_size_align(bytes, align).ok()?;
            // SAFETY: `layout` has non-zero size whenever `bytes > 0`, which
            // is always true for generation allocations (header + slots).
            let ptr = unsafe { alloc_zeroed(layout) };
            let ptr = NonNull::new(ptr)?;
            Some((ptr, bytes))
        }

        unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize, align: usize) {
            let layout = match Layout::from_size_align(bytes, align) {
                Ok(layout) => layout,
                Err(_) => handle_alloc_error(Layout::new::<u8>()),
            };
            // SAFETY: forwarded from the caller's obligation.
            unsafe { dealloc(ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(feature = "alloc")]
pub use alloc_region::AllocRegion;
