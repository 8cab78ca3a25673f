// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A lock-free, expanding, open-addressed hash table for 64-bit key/value
//! pairs.
//!
//! The table ([`map::Map`]) grows by allocating a brand new, double-size
//! [`generation::Generation`] and swinging an atomic head pointer onto it;
//! readers and writers already in flight keep working against whichever
//! generation they loaded, cooperatively copying entries forward
//! ([`migrator`]) a few at a time as they go, so growth never stops the
//! world. Backing memory for each generation comes from a pluggable
//! [`region::RegionSource`], so the table itself has no opinion on `mmap`
//! vs. the global allocator vs. anything else.
//!
//! ```
//! use chash_core::{map::Map, region::AllocRegion};
//!
//! let map = Map::init(16, AllocRegion).unwrap();
//! assert!(map.add(42, 1));
//! assert_eq!(map.find(42), Some(1));
//! assert!(map.remove(42));
//! assert_eq!(map.find(42), None);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod hash;

#[cfg(feature = "alloc")]
pub mod expander;
#[cfg(feature = "alloc")]
pub mod generation;
#[cfg(feature = "alloc")]
pub mod map;
#[cfg(feature = "alloc")]
pub mod migrator;
#[cfg(feature = "alloc")]
pub mod region;
#[cfg(feature = "alloc")]
mod slot;

#[cfg(feature = "alloc")]
mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
