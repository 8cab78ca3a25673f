// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The public map: a concurrent, expanding, open-addressed table of
//! 64-bit key/value pairs, with no locks and no suspension of readers or
//! writers during growth.
//!
//! A [`Map`] is a chain of [`Generation`]s, newest first. Writes only ever
//! target the newest (the "head"); every operation also pays a small
//! amount of migration tax forward on the head's immediate predecessor, so
//! growth finishes without any thread having to stop and wait for it.

use crate::error::InitError;
use crate::expander;
use crate::generation::Generation;
use crate::hash::{hash_key, home_index};
use crate::migrator;
use crate::region::RegionSource;
use crate::slot::Slot;
use crate::sync::primitive::{AtomicPtr, Ordering};
use core::ptr::NonNull;

#[cfg(feature = "event-tracing")]
use tracing::trace;

/// Largest capacity a generation may grow to. Doubling stops once the next
/// step would exceed this.
pub const MAX_CAPACITY: u32 = 1 << 31;

/// A lock-free, expanding, open-addressed hash table from 64-bit keys to
/// 64-bit values.
///
/// Keys must be non-zero with their low bit clear (that bit is reserved
/// for the internal assimilation mark); values must be non-zero (zero is
/// the tombstone). Operations on keys or values outside that range return
/// `false`/`None` rather than panicking.
///
/// Removing an entry does not reclaim its slot: the table's claimed-slot
/// count, which drives expansion, only ever grows. See [`Map::len`].
pub struct Map<R: RegionSource> {
    head: AtomicPtr<Generation>,
    region: R,
}

#[inline]
fn is_valid_key(key: u64) -> bool {
    key != 0 && !Slot::is_assimilated(key)
}

impl<R: RegionSource> Map<R> {
    /// Creates a map with an initial capacity of at least `capacity_hint`
    /// slots (rounded up to the next power of two), backed by `region`.
    pub fn init(capacity_hint: u32, region: R) -> Result<Self, InitError> {
        if capacity_hint == 0 || capacity_hint > MAX_CAPACITY {
            return Err(InitError::InvalidCapacity);
        }
        let capacity = capacity_hint.next_power_of_two();

        let head_ptr =
            Generation::alloc(&region, capacity, None).ok_or(InitError::RegionAllocation)?;

        Ok(Self {
            head: AtomicPtr::new(head_ptr.as_ptr()),
            region,
        })
    }

    /// Inserts `key` -> `value`, overwriting any existing value for `key`.
    /// Returns `false` if `key` or `value` is out of range (see the
    /// type-level docs), never if the operation raced.
    pub fn add(&self, key: u64, value: u64) -> bool {
        if !is_valid_key(key) || value == 0 {
            return false;
        }
        self.add_impl(key, value, true)
    }

    /// Removes `key`'s entry, if present. Returns `true` iff `key` held a
    /// live, non-tombstone value at the moment of removal. An already
    /// tombstoned or never-inserted key still claims its slot forever (see
    /// the type-level docs on `len`), but returns `false` here either way.
    pub fn remove(&self, key: u64) -> bool {
        if !is_valid_key(key) {
            return false;
        }

        let hash = hash_key(key);

        loop {
            let head_ptr = self.load_head();
            // SAFETY: `head_ptr` is always a live generation; generations
            // are never freed while the map exists.
            let head = unsafe { head_ptr.as_ref() };

            self.pay_migration_tax(head, key, hash);

            let mask = head.mask();
            // SAFETY: `head_ptr` is live and sized for `head.capacity()`.
            let slots = unsafe { Generation::slots(head_ptr) };
            let home = home_index(hash, mask);
            let mut i = home;

            let outcome = 'probe: loop {
                let slot = &slots[i as usize];
                let raw_key = slot.load_key();

                if raw_key == key {
                    loop {
                        let current = slot.load_value();
                        if slot.try_set_value(current, 0) {
                            // True iff the key held a live (non-tombstone)
                            // value at the moment this CAS won; a key that
                            // was already tombstoned still claims the slot
                            // (it's never vacant again) but was not
                            // "present" in the sense this return means.
                            break 'probe Some(current != 0);
                        }
                    }
                }

                if Slot::is_vacant(raw_key) {
                    break 'probe Some(false);
                }

                i = (i + 1) & mask;
                if i == home {
                    break 'probe None;
                }
            };

            match outcome {
                Some(result) => {
                    if head.is_assimilated() {
                        continue; // slow-thread last gasp
                    }
                    return result;
                }
                None => return false,
            }
        }
    }

    /// Looks up `key`'s current value.
    pub fn find(&self, key: u64) -> Option<u64> {
        if !is_valid_key(key) {
            return None;
        }

        let hash = hash_key(key);

        loop {
            let head_ptr = self.load_head();
            // SAFETY: see `remove`.
            let head = unsafe { head_ptr.as_ref() };

            self.pay_migration_tax(head, key, hash);

            let mask = head.mask();
            // SAFETY: see `remove`.
            let slots = unsafe { Generation::slots(head_ptr) };
            let home = home_index(hash, mask);
            let mut i = home;

            let outcome = 'probe: loop {
                let slot = &slots[i as usize];
                let raw_key = slot.load_key();

                if Slot::is_vacant(raw_key) {
                    break 'probe Some(None);
                }

                if raw_key == key {
                    let value = slot.load_value();
                    break 'probe Some(if value == 0 { None } else { Some(value) });
                }

                i = (i + 1) & mask;
                if i == home {
                    break 'probe None;
                }
            };

            match outcome {
                Some(result) => {
                    if head.is_assimilated() {
                        continue; // slow-thread last gasp
                    }
                    return result;
                }
                None => return None,
            }
        }
    }

    /// A best-effort sum of every reachable generation's claimed-slot count.
    ///
    /// This is not a live-entry count: removed entries keep their slot
    /// claimed (see the type-level docs), and a key that has been migrated
    /// forward is counted once in its old generation (until that generation
    /// is walked off the chain -- it never is, see the crate's design notes
    /// on reclamation) and again in whichever generation it landed in, so
    /// this is a diagnostic upper bound, not an exact entry count.
    pub fn len(&self) -> u64 {
        // SAFETY: see `remove`.
        let mut current = Some(unsafe { self.load_head().as_ref() });
        let mut total = 0u64;
        while let Some(generation) = current {
            total += u64::from(generation.load_count());
            // SAFETY: a predecessor link, once published, stays valid for
            // the lifetime of the map (generations are freed only by
            // `Map::drop`, which requires `&mut self`).
            current = generation.predecessor().map(|ptr| unsafe { ptr.as_ref() });
        }
        total
    }

    fn load_head(&self) -> NonNull<Generation> {
        // SAFETY: the head pointer is initialized in `init` and only ever
        // swung onto a freshly published generation by `expander::grow`;
        // it is never null or dangling for the lifetime of the map.
        unsafe { NonNull::new_unchecked(self.head.load(Ordering::SeqCst)) }
    }

    /// The internal add path shared by `add` and the migrator's reinsert
    /// callback. `pay_tax` is `false` only when called from inside
    /// `pay_migration_tax` itself, so migrating a generation never
    /// recursively schedules more migration of the same generation.
    fn add_impl(&self, key: u64, value: u64, pay_tax: bool) -> bool {
        let hash = hash_key(key);

        loop {
            let head_ptr = self.load_head();
            // SAFETY: see `remove`.
            let head = unsafe { head_ptr.as_ref() };

            if pay_tax {
                self.pay_migration_tax(head, key, hash);
            }

            let mask = head.mask();
            // SAFETY: see `remove`.
            let slots = unsafe { Generation::slots(head_ptr) };
            let home = home_index(hash, mask);
            let mut i = home;

            let outcome = 'probe: loop {
                let slot = &slots[i as usize];
                let raw_key = slot.load_key();

                if Slot::is_vacant(raw_key) {
                    if slot.try_claim(key) {
                        slot.store_value(value);
                        if head.record_insert() {
                            expander::grow(&self.region, &self.head, head_ptr, MAX_CAPACITY);
                        }
                        break 'probe Some(true);
                    }
                    continue 'probe;
                }

                if raw_key == key {
                    let current = slot.load_value();
                    if slot.try_set_value(current, value) {
                        break 'probe Some(true);
                    }
                    continue 'probe;
                }

                i = (i + 1) & mask;
                if i == home {
                    break 'probe None;
                }
            };

            match outcome {
                Some(result) => {
                    if head.is_assimilated() {
                        continue; // slow-thread last gasp
                    }
                    return result;
                }
                None => return false,
            }
        }
    }

    /// Migrates up to [`migrator::TAX`] entries from `head`'s immediate
    /// predecessor forward into `head`, prioritizing `key` so that by the
    /// time this returns, `key`'s entry (if any) is guaranteed to be
    /// visible in `head`.
    ///
    /// Only ever looks one generation back: by the time a generation's own
    /// predecessor needed migrating, that predecessor's predecessor had
    /// already been fully assimilated during the prior epoch, as long as
    /// the tax rate keeps migration ahead of new growth (see
    /// [`migrator::TAX`]'s doc comment).
    fn pay_migration_tax(&self, head: &Generation, key: u64, hash: u32) {
        let Some(pred_ptr) = head.predecessor() else {
            return;
        };
        // SAFETY: `pred_ptr` was published by a prior `expander::grow` and
        // is never freed while reachable from the generation chain.
        let pred = unsafe { pred_ptr.as_ref() };
        if pred.is_assimilated() {
            return;
        }

        let moved = migrator::assimilate(pred_ptr, key, hash, migrator::TAX, |k, v| {
            self.add_impl(k, v, false);
        });

        if moved < migrator::TAX {
            pred.mark_assimilated();
            #[cfg(feature = "event-tracing")]
            trace!(capacity = pred.capacity(), "generation assimilated");
        }
    }
}

impl<R: RegionSource> Drop for Map<R> {
    fn drop(&mut self) {
        let mut current = NonNull::new(*self.head.get_mut());
        while let Some(gen_ptr) = current {
            // SAFETY: `&mut self` means no other thread can be operating
            // on any generation in this chain; each was published exactly
            // once by `init` or `expander::grow` and is freed exactly once
            // here.
            let predecessor = unsafe { gen_ptr.as_ref() }.predecessor();
            unsafe { Generation::free(&self.region, gen_ptr) };
            current = predecessor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::AllocRegion;

    fn small_map() -> Map<AllocRegion> {
        Map::init(8, AllocRegion).expect("init to succeed")
    }

    #[test]
    fn rejects_invalid_keys_and_values() {
        let map = small_map();
        assert!(!map.add(0, 2));
        assert!(!map.add(3, 2)); // odd key: low bit reserved
        assert!(!map.add(2, 0)); // zero value: tombstone marker
        assert!(map.find(0).is_none());
        assert!(!map.remove(0));
    }

    #[test]
    fn add_find_remove_round_trip() {
        let map = small_map();
        assert!(map.add(16, 100));
        assert_eq!(map.find(16), Some(100));
        assert!(map.add(16, 200)); // overwrite
        assert_eq!(map.find(16), Some(200));
        assert!(map.remove(16));
        assert_eq!(map.find(16), None);
        assert!(map.find(32).is_none());
    }

    #[test]
    fn remove_of_absent_key_returns_false() {
        let map = small_map();
        assert!(!map.remove(16));
    }

    #[test]
    fn remove_of_tombstoned_key_returns_false() {
        let map = small_map();
        assert!(map.add(16, 100));
        assert!(map.remove(16));
        assert!(!map.remove(16)); // already tombstoned, not "present"
    }

    #[test]
    fn len_counts_claimed_slots_not_live_entries() {
        let map = small_map();
        assert_eq!(map.len(), 0);
        map.add(16, 1);
        map.add(32, 1);
        assert_eq!(map.len(), 2);
        map.remove(16);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn len_sums_the_whole_generation_chain() {
        // Right after a generation is published, its predecessor still
        // holds every entry the migrator hasn't yet copied forward; `len`
        // must see that entry too, not just the (mostly empty) new head.
        // Built by hand (rather than by driving `Map::add` past a real
        // threshold) so the expected total doesn't depend on exactly how
        // much of the predecessor the migrator has already dragged forward.
        let region = AllocRegion;
        let old_ptr = Generation::alloc(&region, 4, None).unwrap();
        // SAFETY: freshly allocated above, not yet reachable from any map.
        let old = unsafe { old_ptr.as_ref() };
        old.record_insert();
        old.record_insert();
        old.record_insert(); // old generation's claimed-slot count is 3

        let new_ptr = Generation::alloc(&region, 8, Some(old_ptr)).unwrap();
        // SAFETY: see above.
        unsafe { new_ptr.as_ref() }.record_insert(); // new generation's count is 1

        let map = Map {
            head: AtomicPtr::new(new_ptr.as_ptr()),
            region,
        };

        assert_eq!(map.len(), 4); // 3 (predecessor) + 1 (head)
    }

    #[test]
    fn expands_past_initial_capacity() {
        let map = Map::init(8, AllocRegion).unwrap();
        for i in 1..64u64 {
            assert!(map.add(i * 2, i));
        }
        for i in 1..64u64 {
            assert_eq!(map.find(i * 2), Some(i));
        }
    }

    #[test]
    fn init_rejects_zero_and_oversized_capacity() {
        assert_eq!(Map::init(0, AllocRegion).unwrap_err(), InitError::InvalidCapacity);
        assert_eq!(
            Map::init(MAX_CAPACITY + 1, AllocRegion).unwrap_err(),
            InitError::InvalidCapacity
        );
    }

    #[test]
    fn small_sequence_survives_repeated_doubling() {
        let map = Map::init(16, AllocRegion).unwrap();
        for i in 16..48u64 {
            assert!(map.add(i * 16, i));
        }
        for i in 16..48u64 {
            assert_eq!(map.find(i * 16), Some(i));
        }
    }

    #[test]
    fn survives_forced_growth_from_minimum_capacity() {
        // The "forced heavy growth from minimum" scenario, verbatim:
        // grow from a single-slot table through 32,768 sequential inserts,
        // check every key is still reachable, and check the resulting
        // generation chain is exactly as long as repeated doubling from
        // capacity 1 up to 32,768 requires.
        const KEYS: u64 = 32_768;

        let map = Map::init(1, AllocRegion).unwrap();
        for i in 1..=KEYS {
            assert!(map.add(i * 16, i));
        }
        for i in 1..=KEYS {
            assert_eq!(map.find(i * 16), Some(i));
        }

        let mut chain_len = 0u32;
        // SAFETY: every generation on the chain stays reachable and valid
        // for the lifetime of the map, which is still alive here.
        let mut current = Some(unsafe { map.load_head().as_ref() });
        while let Some(generation) = current {
            chain_len += 1;
            current = generation.predecessor().map(|ptr| unsafe { ptr.as_ref() });
        }

        // initial_capacity_rounded_up is 1, so log2(32768 / 1) + 1 == 16.
        assert_eq!(chain_len, 16);
    }

    #[test]
    fn remove_survives_a_growth_boundary() {
        let map = Map::init(4, AllocRegion).unwrap();
        assert!(map.add(16, 1));
        assert!(map.add(32, 2));
        assert!(map.add(48, 3));
        assert!(map.add(64, 4));
        assert!(map.add(80, 5)); // crosses the threshold, expansion fires
        assert!(map.remove(32));
        assert_eq!(map.find(32), None);
        assert_eq!(map.find(64), Some(4));
    }

    #[test]
    fn update_across_growth_sees_latest_value() {
        let map = Map::init(16, AllocRegion).unwrap();
        for i in 16..64u64 {
            assert!(map.add(i * 16, 1));
        }
        for i in 16..64u64 {
            assert!(map.add(i * 16, 2));
        }
        for i in 16..64u64 {
            assert_eq!(map.find(i * 16), Some(2));
        }
    }

    #[test]
    fn concurrent_disjoint_inserts_all_land() {
        use std::sync::Arc;
        use std::thread;

        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 10_000;

        let map = Arc::new(Map::init(1024, AllocRegion).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let key = (t * PER_THREAD + i + 1) * 16;
                        assert!(map.add(key, i + 1));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for t in 0..THREADS {
            for i in 0..PER_THREAD {
                let key = (t * PER_THREAD + i + 1) * 16;
                assert_eq!(map.find(key), Some(i + 1));
            }
        }
    }

    #[test]
    fn concurrent_shared_key_inserts_leave_some_winner_visible() {
        use std::sync::Arc;
        use std::thread;

        const THREADS: u64 = 8;
        const KEYS: u64 = 1000;

        let map = Arc::new(Map::init(1024, AllocRegion).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for k in 1..KEYS {
                        map.add(k * 16, t);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for k in 1..KEYS {
            let winner = map.find(k * 16).expect("every shared key has a writer");
            assert!(winner < THREADS);
        }
    }
}
