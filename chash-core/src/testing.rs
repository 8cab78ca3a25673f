// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Test-only helpers shared by the unit, bolero, and loom test modules.

#[cfg(all(test, not(loom)))]
pub mod loom {
    pub use std::*;

    pub fn model<F: 'static + FnOnce() -> R, R>(f: F) -> R {
        f()
    }
}

#[cfg(all(test, loom))]
pub use loom;

/// A `std::collections::HashMap`-backed oracle used by the bolero model tests
/// to check the map's add/remove/find behavior against a trusted reference.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct Oracle {
    entries: std::collections::HashMap<u64, u64>,
}

#[cfg(test)]
impl Oracle {
    pub fn add(&mut self, key: u64, value: u64) -> bool {
        if key == 0 || key & 1 == 1 || value == 0 {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: u64) -> bool {
        if key == 0 || key & 1 == 1 {
            return false;
        }
        self.entries.remove(&key).is_some()
    }

    pub fn find(&self, key: u64) -> Option<u64> {
        if key == 0 || key & 1 == 1 {
            return None;
        }
        self.entries.get(&key).copied()
    }
}
