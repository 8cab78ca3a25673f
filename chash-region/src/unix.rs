// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! `mmap`/`munmap` plumbing for [`crate::MmapRegion`].

use core::ptr::NonNull;

/// Rounds `bytes` up to the next multiple of the system page size.
fn page_round(bytes: usize) -> Option<usize> {
    if bytes == 0 {
        return None;
    }
    // SAFETY: `sysconf` with `_SC_PAGESIZE` is always safe to call and
    // never fails on a real Unix kernel.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    let mask = page_size - 1;
    bytes.checked_add(mask).map(|rounded| rounded & !mask)
}

/// Maps a zeroed, anonymous, private region of at least `bytes` bytes.
///
/// `align` is only validated, not acted on: every mapping the kernel hands
/// back is page-aligned, and `chash-core` never asks for an alignment
/// wider than a page (a `Generation` header plus its slot array is, at
/// most, 8-byte aligned).
pub(crate) fn map(bytes: usize, align: usize) -> Option<(NonNull<u8>, usize)> {
    if !align.is_power_of_two() || align > 4096 {
        return None;
    }
    let len = page_round(bytes)?;

    // SAFETY: `MAP_ANONYMOUS | MAP_PRIVATE` with a null address hint asks
    // the kernel for a fresh mapping; there is no file descriptor or
    // existing memory involved, so this call has no preconditions beyond
    // `len` being non-zero (checked by `page_round`).
    let raw = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
            -1,
            0,
        )
    };

    if raw == libc::MAP_FAILED {
        return None;
    }

    // Anonymous mappings are zero-filled by the kernel on first touch;
    // `Generation::alloc` relies on this to skip a separate zeroing pass.
    let ptr = NonNull::new(raw.cast::<u8>())?;
    Some((ptr, len))
}

/// Releases a mapping previously returned by [`map`].
///
/// # Safety
///
/// `ptr` and `bytes` must be the exact pointer and *requested* length from
/// a prior call to [`map`] on the same process; `align` is unused here but
/// kept for symmetry with `map`'s signature.
pub(crate) unsafe fn unmap(ptr: NonNull<u8>, bytes: usize, _align: usize) {
    let len = page_round(bytes).expect("bytes was a valid mmap length");
    // SAFETY: `ptr`/`len` are exactly the pointer and page-rounded length
    // this region's `map` call returned; the caller guarantees no other
    // reference to this region is live.
    let result = unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
    debug_assert_eq!(result, 0, "munmap failed on a mapping this crate owns");
}
