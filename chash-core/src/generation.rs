// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A single table version: a header of generation-wide bookkeeping followed
//! by its slot array, allocated as one region so a generation can be handed
//! off and freed as a single unit.
//!
//! Generations form a singly linked stack through `predecessor`, newest
//! first. The map only ever writes through the newest (the "head"); older
//! generations are walked by the migrator and, for reads, by the
//! slow-thread retry path in `map::find`.

use crate::region::RegionSource;
use crate::slot::Slot;
use crate::sync::primitive::{AtomicBool, AtomicU32, Ordering};
use core::alloc::Layout;
use core::ptr::NonNull;
use crossbeam_utils::CachePadded;

/// Load factor at which a generation schedules the next expansion.
///
/// Expressed as a ratio rather than a float so the comparison
/// (`count * 10 >= capacity * 6`) stays integer-only on the hot path.
const THRESHOLD_NUM: u32 = 6;
const THRESHOLD_DEN: u32 = 10;

/// A table version: capacity, load bookkeeping, a migration cursor, and a
/// link to the generation it grew out of. The slot array immediately
/// follows this header in the same allocation.
#[repr(C)]
pub(crate) struct Generation {
    capacity: u32,
    mask: u32,
    threshold: u32,
    /// Cache-padded: every insert on this generation touches it, so it
    /// should not share a line with neighboring fields another thread is
    /// hammering at the same time.
    count: CachePadded<AtomicU32>,
    /// Set once a migrator has confirmed every slot is either vacant or
    /// carries the assimilation mark. A predecessor generation is fully
    /// retired once this is `true`; the map then stops consulting it.
    assimilated: AtomicBool,
    predecessor: Option<NonNull<Generation>>,
    alloc_ptr: NonNull<u8>,
    alloc_len: usize,
    alloc_align: usize,
}

impl Generation {
    /// Allocates and initializes a new generation of `capacity` slots
    /// (must be a power of two) linked to `predecessor`.
    ///
    /// Relies on the [`RegionSource`] contract that returned memory is
    /// zeroed: the all-zero byte pattern is exactly a slot array of vacant
    /// slots (`key == 0`, `value == 0`), so no per-slot initialization pass
    /// is needed.
    pub(crate) fn alloc<R: RegionSource>(
        region: &R,
        capacity: u32,
        predecessor: Option<NonNull<Generation>>,
    ) -> Option<NonNull<Generation>> {
        debug_assert!(capacity.is_power_of_two());
        let layout = Self::layout_for(capacity)?;
        let (ptr, len) = region.alloc(layout.size(), layout.align())?;
        let gen_ptr = ptr.cast::<Generation>();
        // Multiply before dividing: `capacity` is a power of two and not
        // generally a multiple of `THRESHOLD_DEN`, so dividing first would
        // truncate almost all the way to zero for small capacities (e.g.
        // capacity 16 would give a threshold of 6 instead of 9). The
        // widening through `u64` keeps `capacity * THRESHOLD_NUM` from
        // overflowing `u32` at the largest capacities this table allows.
        let threshold = (u64::from(capacity) * u64::from(THRESHOLD_NUM) / u64::from(THRESHOLD_DEN)) as u32;

        // SAFETY: `ptr` was just allocated with exactly `layout`, which was
        // sized and aligned to hold a `Generation` header; writing the
        // header does not touch the trailing slot bytes.
        unsafe {
            gen_ptr.as_ptr().write(Generation {
                capacity,
                mask: capacity - 1,
                threshold,
                count: CachePadded::new(AtomicU32::new(0)),
                assimilated: AtomicBool::new(false),
                predecessor,
                alloc_ptr: ptr,
                alloc_len: len,
                alloc_align: layout.align(),
            });
        }

        Some(gen_ptr)
    }

    /// Releases a generation's backing region. The caller must guarantee no
    /// other thread holds a reference to `gen_ptr` or its slots.
    ///
    /// # Safety
    ///
    /// `gen_ptr` must have been returned by [`Generation::alloc`] on this
    /// `region`, and must not be used again after this call.
    pub(crate) unsafe fn free<R: RegionSource>(region: &R, gen_ptr: NonNull<Generation>) {
        // SAFETY: `gen_ptr` points at a live `Generation` per the caller's
        // obligation; reading it out moves the (Copy-free but POD-like)
        // header fields we need and leaves the allocation to `region.free`.
        let header = unsafe { gen_ptr.as_ptr().read() };
        // SAFETY: `alloc_ptr`/`alloc_len`/`alloc_align` are exactly the
        // triple this generation's allocation returned.
        unsafe { region.free(header.alloc_ptr, header.alloc_len, header.alloc_align) };
    }

    fn layout_for(capacity: u32) -> Option<Layout> {
        let header = Layout::new::<Generation>();
        let slots = Layout::array::<Slot>(capacity as usize).ok()?;
        let (combined, _offset) = header.extend(slots).ok()?;
        Some(combined.pad_to_align())
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub(crate) fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub(crate) fn predecessor(&self) -> Option<NonNull<Generation>> {
        self.predecessor
    }

    #[inline]
    pub(crate) fn is_assimilated(&self) -> bool {
        self.assimilated.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_assimilated(&self) {
        self.assimilated.store(true, Ordering::SeqCst);
    }

    /// Returns a slice over this generation's slot array.
    ///
    /// # Safety
    ///
    /// `gen_ptr` must point at a live `Generation` whose allocation is at
    /// least `layout_for(capacity)` in size (always true for the result of
    /// `alloc`).
    pub(crate) unsafe fn slots<'a>(gen_ptr: NonNull<Generation>) -> &'a [Slot] {
        // SAFETY: forwarded from the caller.
        let capacity = unsafe { (*gen_ptr.as_ptr()).capacity };
        let header_layout = Layout::new::<Generation>();
        let slots_layout =
            Layout::array::<Slot>(capacity as usize).expect("validated at alloc time");
        let offset = header_layout
            .extend(slots_layout)
            .expect("validated at alloc time")
            .1;
        // SAFETY: `offset` is exactly where `alloc` laid out the slot
        // array relative to the header.
        let base = gen_ptr.as_ptr().cast::<u8>();
        let slots_ptr = unsafe { base.add(offset) }.cast::<Slot>();
        // SAFETY: `slots_ptr` is non-null (derived from `gen_ptr`) and
        // valid for `capacity` `Slot`s for the lifetime of the generation.
        unsafe { core::slice::from_raw_parts(slots_ptr, capacity as usize) }
    }

    /// Increments the claimed-slot count and reports whether the
    /// generation has just crossed its expansion threshold (the count
    /// *after* this insert strictly exceeds `threshold`, matching the
    /// original table's "grow when more than threshold are full" rule
    /// exactly).
    ///
    /// This count is monotonic: it tracks slots ever claimed, not slots
    /// currently holding a non-tombstoned value. Removing an entry frees
    /// no capacity, by design (see the crate's non-goals on tombstone
    /// reclamation) — a removed key's slot stays claimed forever.
    pub(crate) fn record_insert(&self) -> bool {
        let count_before = self.count.fetch_add(1, Ordering::SeqCst);
        count_before + 1 > self.threshold
    }

    pub(crate) fn load_count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}
