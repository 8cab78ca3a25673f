// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Non-Unix stand-in for [`crate::unix`]: there is no portable anonymous
//! mapping syscall to reach for, so [`crate::MmapRegion`] simply refuses to
//! allocate rather than silently falling back to the heap. Callers on these
//! targets should use `chash_core::region::AllocRegion` directly.

use core::ptr::NonNull;

pub(crate) fn map(_bytes: usize, _align: usize) -> Option<(NonNull<u8>, usize)> {
    None
}

pub(crate) unsafe fn unmap(_ptr: NonNull<u8>, _bytes: usize, _align: usize) {
    unreachable!("map() never succeeds on this target, so free() is never called");
}
