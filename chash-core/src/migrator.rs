// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The migration tax: copying one generation's live entries forward into
//! its successor, a few slots at a time, paid by every operation that
//! lands on a generation with an un-assimilated predecessor.
//!
//! This module holds only the pure slot-walking logic. It has no opinion
//! on how a copied entry gets re-inserted into the destination generation;
//! callers pass a `reinsert` closure (`map::Map` wires this to its own
//! internal, tax-free insert path, since paying tax again while paying tax
//! would never converge).

use crate::generation::Generation;
use crate::slot::Slot;
use core::ptr::NonNull;

/// Minimum number of entries each operation attempts to migrate while its
/// generation has an un-assimilated predecessor.
///
/// Chosen, as in the source this crate is derived from, so that a
/// generation which has just doubled cannot possibly need to grow again
/// before its predecessor finishes migrating: a tax rate above 1 always
/// keeps the migrator ahead of new insertions.
pub(crate) const TAX: u32 = 3;

/// Walks `from`'s slot array starting at `key`'s home index, copying up to
/// `count` live entries forward via `reinsert`, and marking every slot it
/// visits as assimilated so stragglers can no longer write into `from`.
///
/// Keeps walking past `count` until it has also personally resolved
/// `key` itself (found it and moved it, found it already marked, or found
/// an empty slot proving it was never in `from`) — so that by the time
/// this returns, the caller's own probe of the destination generation is
/// guaranteed to see `key`'s entry if `from` ever held one.
///
/// Returns the number of entries actually copied. `from` should be marked
/// fully assimilated by the caller once this returns fewer than `count`
/// copies and `from`'s slots have all been walked at least once; in
/// practice that is approximated by calling this repeatedly until it
/// returns `0` on a pass that started from `key`'s home slot.
pub(crate) fn assimilate<F>(from_ptr: NonNull<Generation>, key: u64, hash: u32, count: u32, mut reinsert: F) -> u32
where
    F: FnMut(u64, u64),
{
    // SAFETY: `from_ptr` is a generation still reachable from the map's
    // generation chain; the caller holds it exactly for the duration of
    // this call.
    let from = unsafe { from_ptr.as_ref() };

    if from.is_assimilated() {
        return 0;
    }

    let mask = from.mask();
    // SAFETY: `from_ptr` is live and was allocated with `from.capacity()`
    // slots.
    let slots = unsafe { Generation::slots(from_ptr) };

    let marked_key = Slot::marked(key);
    let home = hash & mask;
    let mut i = home;
    let mut moved = 0u32;
    // Mirrors the "have we personally accounted for `key`" bookkeeping in
    // the reference migrator: `resolved` once we've seen `key` either
    // absent, already marked, or freshly moved by us.
    let mut resolved = false;
    let mut move_this_one = false;

    loop {
        let slot = &slots[i as usize];
        let raw_key = slot.load_key();

        if Slot::is_vacant(raw_key) || raw_key == marked_key {
            resolved = true;
        } else if raw_key == key {
            resolved = true;
            move_this_one = true;
        }

        if move_this_one || moved < count {
            move_this_one = false;

            if !Slot::is_vacant(raw_key) && !Slot::is_assimilated(raw_key) && slot.try_mark_assimilated(raw_key) {
                let value = slot.load_value();
                if value != 0 {
                    reinsert(Slot::user_key(raw_key), value);
                    moved += 1;
                }
            }
        } else if resolved && moved >= count {
            break;
        }

        i = (i + 1) & mask;
        if i == home {
            break;
        }
    }

    moved
}
