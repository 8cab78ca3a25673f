// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Growing the map: allocate a new, double-capacity generation and swing
//! the head pointer onto it. Lock-free and cooperative — any thread whose
//! insert crosses the load-factor threshold attempts this, and only one of
//! them wins the race to publish the new generation.

use crate::generation::Generation;
use crate::region::RegionSource;
use crate::sync::primitive::{AtomicPtr, Ordering};
use core::ptr::NonNull;

#[cfg(feature = "event-tracing")]
use tracing::trace;

/// Attempts to double the table's capacity by allocating a new generation
/// linked to `old_ptr` and swinging `head` from `old_ptr` onto it.
///
/// Returns `true` if this call (or a concurrent racer) published a new
/// generation, `false` if capacity is already maxed out, allocation
/// failed, or a concurrent racer's generation won the race to publish —
/// in the last case the caller's own attempt was redundant, not failed:
/// the table did grow, just not via this call.
pub(crate) fn grow<R: RegionSource>(
    region: &R,
    head: &AtomicPtr<Generation>,
    old_ptr: NonNull<Generation>,
    max_capacity: u32,
) -> bool {
    // SAFETY: `old_ptr` is the generation the caller just finished an
    // operation against, and generations are never freed while reachable.
    let old = unsafe { old_ptr.as_ref() };
    let new_capacity = match old.capacity().checked_mul(2) {
        Some(capacity) if capacity <= max_capacity => capacity,
        _ => return false,
    };

    let new_ptr = match Generation::alloc(region, new_capacity, Some(old_ptr)) {
        Some(ptr) => ptr,
        None => return false,
    };

    let old_raw = old_ptr.as_ptr();
    let new_raw = new_ptr.as_ptr();

    match head.compare_exchange(old_raw, new_raw, Ordering::SeqCst, Ordering::SeqCst) {
        Ok(_) => {
            #[cfg(feature = "event-tracing")]
            trace!(old_capacity = old.capacity(), new_capacity, "generation published");
            true
        }
        Err(_) => {
            // Lost the race: somebody else already grew the table (or is
            // growing it right now from the same `old_ptr`). Free the
            // generation we allocated; it was never published, so nothing
            // else can be holding a reference to it.
            // SAFETY: `new_ptr` was allocated on `region` above and the CAS
            // that would have published it just failed.
            unsafe { Generation::free(region, new_ptr) };
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::AllocRegion;

    #[test]
    fn grow_publishes_a_doubled_generation() {
        let region = AllocRegion;
        let old_ptr = Generation::alloc(&region, 16, None).unwrap();
        let head = AtomicPtr::new(old_ptr.as_ptr());

        assert!(grow(&region, &head, old_ptr, 1024));

        let new_ptr = NonNull::new(head.load(Ordering::SeqCst)).unwrap();
        assert_ne!(new_ptr, old_ptr);
        // SAFETY: just published above, still reachable.
        let new_gen = unsafe { new_ptr.as_ref() };
        assert_eq!(new_gen.capacity(), 32);
        assert_eq!(new_gen.predecessor(), Some(old_ptr));

        // SAFETY: both generations are unreachable after this test; no
        // other thread ever saw them.
        unsafe {
            Generation::free(&region, new_ptr);
            Generation::free(&region, old_ptr);
        }
    }

    #[test]
    fn grow_refuses_past_max_capacity() {
        let region = AllocRegion;
        let old_ptr = Generation::alloc(&region, 1024, None).unwrap();
        let head = AtomicPtr::new(old_ptr.as_ptr());

        assert!(!grow(&region, &head, old_ptr, 1024));
        assert_eq!(head.load(Ordering::SeqCst), old_ptr.as_ptr());

        unsafe { Generation::free(&region, old_ptr) };
    }
}
