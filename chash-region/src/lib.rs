// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A [`chash_core::region::RegionSource`] backed by anonymous, private page
//! mappings on Unix-like kernels.
//!
//! `chash_core::region::AllocRegion` is enough to run the map anywhere the
//! global allocator exists, but every generation it hands back is backed by
//! ordinary heap memory: a 2 GiB generation costs 2 GiB of committed
//! address space the moment it's allocated. [`MmapRegion`] instead asks the
//! kernel for a reservation that is lazily committed page by page as the
//! slot array is actually written to, which matters once a table has grown
//! large enough that eager commit would be wasteful.
//!
//! On non-Unix targets this crate still builds, but [`MmapRegion::alloc`]
//! always returns `None`: there is no portable anonymous-mapping syscall to
//! fall back to, and silently degrading to heap allocation here would hide
//! that choice from callers who specifically reached for this crate to
//! avoid it.

use chash_core::region::RegionSource;
use core::ptr::NonNull;

#[cfg(feature = "event-tracing")]
use tracing::trace;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix as imp;
    } else {
        mod fallback;
        use fallback as imp;
    }
}

/// A [`RegionSource`] that requests one anonymous private mapping per
/// generation from the kernel and releases it with `munmap` on `free`.
///
/// Regions are always rounded up to a whole number of pages: the kernel
/// only ever hands back page-granularity mappings, and `chash-core` only
/// relies on the returned size being `>= bytes`, so the rounding is
/// invisible to callers.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmapRegion;

// SAFETY: `free` is only ever invoked by `Generation::free` with the exact
// `(ptr, bytes, align)` triple a prior `alloc` call returned on this same
// `MmapRegion`, matching the page-rounded length actually mapped.
unsafe impl RegionSource for MmapRegion {
    fn alloc(&self, bytes: usize, align: usize) -> Option<(NonNull<u8>, usize)> {
        let result = imp::map(bytes, align);
        #[cfg(feature = "event-tracing")]
        if let Some((_, len)) = result {
            trace!(requested = bytes, mapped = len, "region mapped");
        }
        result
    }

    unsafe fn free(&self, ptr: NonNull<u8>, bytes: usize, align: usize) {
        #[cfg(feature = "event-tracing")]
        trace!(bytes, "region unmapped");
        // SAFETY: forwarded from the caller's obligation.
        unsafe { imp::unmap(ptr, bytes, align) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_page_sized_region() {
        let region = MmapRegion;
        let (ptr, len) = region.alloc(4096, 8).expect("mapping to succeed");
        assert!(len >= 4096);
        // SAFETY: freshly mapped above, freed exactly once here.
        unsafe {
            for i in 0..len {
                assert_eq!(*ptr.as_ptr().add(i), 0, "mmap must hand back zeroed pages");
            }
            region.free(ptr, len, 8);
        }
    }

    #[test]
    fn rejects_zero_byte_requests() {
        let region = MmapRegion;
        assert!(region.alloc(0, 8).is_none());
    }

    #[test]
    fn backs_a_live_map() {
        use chash_core::map::Map;

        let map = Map::init(16, MmapRegion).expect("mmap-backed init to succeed");
        for i in 1..128u64 {
            assert!(map.add(i * 2, i));
        }
        for i in 1..128u64 {
            assert_eq!(map.find(i * 2), Some(i));
        }
        assert!(map.remove(2));
        assert_eq!(map.find(2), None);
    }
}
