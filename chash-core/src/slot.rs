// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The two-word slot protocol: a single `(key, value)` pair inside a
//! generation's backing array, updated only through single-word CAS.
//!
//! * `key == 0` means the slot has never been claimed (vacant).
//! * `value == 0` means the slot's key was claimed but its entry was
//!   removed (a tombstone); the key itself is never cleared, so probing
//!   past a tombstone still finds the right home chain.
//! * The low bit of `key` is the assimilation mark, set by the migrator
//!   once a slot's contents have been copied into the next generation. A
//!   marked slot rejects further `add`/`remove` CASes so a straggling
//!   writer can't resurrect an entry the migrator has already moved.
//!
//! Callers never see a raw key with its mark bit set; [`Slot::user_key`]
//! strips it before comparing against a caller-supplied key.

use crate::sync::primitive::{AtomicU64, Ordering};

/// A single key/value pair, addressable only through CAS.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    key: AtomicU64,
    value: AtomicU64,
}

/// Marker bit on the key word, set once the slot has been copied forward
/// by the migrator.
const ASSIMILATED: u64 = 0x1;

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            key: AtomicU64::new(0),
            value: AtomicU64::new(0),
        }
    }

    /// Strips the assimilation mark from a raw key word.
    #[inline]
    pub(crate) fn user_key(raw_key: u64) -> u64 {
        raw_key & !ASSIMILATED
    }

    /// Sets the assimilation mark on a raw key word.
    #[inline]
    pub(crate) fn marked(raw_key: u64) -> u64 {
        raw_key | ASSIMILATED
    }

    #[inline]
    pub(crate) fn is_assimilated(raw_key: u64) -> bool {
        raw_key & ASSIMILATED != 0
    }

    #[inline]
    pub(crate) fn is_vacant(raw_key: u64) -> bool {
        raw_key == 0
    }

    /// Loads the raw key word (mark bit included).
    #[inline]
    pub(crate) fn load_key(&self) -> u64 {
        self.key.load(Ordering::SeqCst)
    }

    /// Loads the value word. `0` means tombstoned.
    #[inline]
    pub(crate) fn load_value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Attempts to claim a vacant slot for `key`. `key` must already have
    /// its low bit clear; callers reject odd keys before reaching the slot
    /// layer (see `map::validate_key`).
    pub(crate) fn try_claim(&self, key: u64) -> bool {
        self.key
            .compare_exchange(0, key, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Unconditionally stores `value`. Only ever called by the thread that
    /// just won `try_claim` for this slot's key, so there is no concurrent
    /// writer to race against; a plain store carries that invariant
    /// through instead of pretending there is a CAS to make.
    pub(crate) fn store_value(&self, value: u64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Attempts to move the value word from `expected` to `new`.
    pub(crate) fn try_set_value(&self, expected: u64, new: u64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Attempts to set the assimilation mark on `unmarked_key`. Fails if a
    /// concurrent migrator already marked the slot, or if the slot's key
    /// somehow no longer matches (it never should: keys are never cleared
    /// once claimed).
    pub(crate) fn try_mark_assimilated(&self, unmarked_key: u64) -> bool {
        debug_assert!(!Self::is_assimilated(unmarked_key));
        self.key
            .compare_exchange(
                unmarked_key,
                unmarked_key | ASSIMILATED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacant_slot_accepts_claim() {
        let slot = Slot::new();
        assert!(Slot::is_vacant(slot.load_key()));
        assert!(slot.try_claim(16));
        assert_eq!(Slot::user_key(slot.load_key()), 16);
    }

    #[test]
    fn claimed_slot_rejects_second_claim() {
        let slot = Slot::new();
        assert!(slot.try_claim(16));
        assert!(!slot.try_claim(32));
        assert_eq!(Slot::user_key(slot.load_key()), 16);
    }

    #[test]
    fn value_cas_respects_expected() {
        let slot = Slot::new();
        slot.try_claim(16);
        assert!(slot.try_set_value(0, 100));
        assert!(!slot.try_set_value(0, 200));
        assert!(slot.try_set_value(100, 200));
        assert_eq!(slot.load_value(), 200);
    }

    #[test]
    fn assimilation_mark_is_sticky() {
        let slot = Slot::new();
        slot.try_claim(16);
        assert!(slot.try_mark_assimilated(16));
        assert!(Slot::is_assimilated(slot.load_key()));
        assert!(!slot.try_mark_assimilated(16));
        assert_eq!(Slot::user_key(slot.load_key()), 16);
    }

    #[test]
    fn loom_concurrent_claims_have_exactly_one_winner() {
        use crate::sync::primitive::Arc;
        use crate::testing::loom;

        loom::model(|| {
            let slot = Arc::new(Slot::new());

            let a = {
                let slot = slot.clone();
                loom::thread::spawn(move || slot.try_claim(16))
            };
            let b = {
                let slot = slot.clone();
                loom::thread::spawn(move || slot.try_claim(32))
            };

            let a_won = a.join().unwrap();
            let b_won = b.join().unwrap();

            assert_ne!(a_won, b_won, "exactly one claimant wins a vacant slot");
            let winner_key = if a_won { 16 } else { 32 };
            assert_eq!(Slot::user_key(slot.load_key()), winner_key);
        });
    }

    #[test]
    fn loom_concurrent_value_updates_leave_one_winner_visible() {
        use crate::sync::primitive::Arc;
        use crate::testing::loom;

        loom::model(|| {
            let slot = Arc::new(Slot::new());
            slot.try_claim(16);
            slot.store_value(1);

            let a = {
                let slot = slot.clone();
                loom::thread::spawn(move || loop {
                    let current = slot.load_value();
                    if slot.try_set_value(current, 2) {
                        break;
                    }
                })
            };
            let b = {
                let slot = slot.clone();
                loom::thread::spawn(move || loop {
                    let current = slot.load_value();
                    if slot.try_set_value(current, 3) {
                        break;
                    }
                })
            };

            a.join().unwrap();
            b.join().unwrap();

            let final_value = slot.load_value();
            assert!(final_value == 2 || final_value == 3);
        });
    }
}
