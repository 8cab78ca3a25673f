// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Atomic primitives shared by the generation, slot, and migrator modules.
//!
//! Production code never reaches for `core::sync::atomic` directly; it goes
//! through [`primitive`] so the same call sites compile against `loom`'s
//! instrumented atomics under `#[cfg(loom)]` test builds.

#[cfg(feature = "alloc")]
pub(crate) mod primitive;
