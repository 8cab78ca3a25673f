// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types. The map's per-operation surface (`add`/`remove`/`find`) is
//! deliberately boolean/`Option`-based, matching the table it's derived
//! from: there is no recoverable error an individual probe can report
//! other than "the key wasn't there" or "the slot was already taken".
//! `InitError` is the one place construction can fail, since it is the one
//! place an allocation failure has nowhere else to go.

use core::fmt;

/// Failure constructing a [`crate::map::Map`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitError {
    /// `capacity_hint` was zero, or rounded up to a power of two beyond
    /// [`crate::map::MAX_CAPACITY`].
    InvalidCapacity,
    /// The configured [`crate::region::RegionSource`] could not supply the
    /// initial generation's backing memory.
    RegionAllocation,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::InvalidCapacity => {
                write!(f, "capacity hint is zero or exceeds the maximum table capacity")
            }
            InitError::RegionAllocation => {
                write!(f, "region source failed to allocate the initial generation")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InitError {}
