// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Swaps the atomic types used throughout the crate for `loom`'s simulated
//! equivalents under `#[cfg(loom)]` test builds, so the same production code
//! paths get exercised under loom's exhaustive interleaving search instead of
//! maintaining a parallel "model" implementation.

#[cfg(all(loom, test))]
mod loom_primitive {
    pub use ::loom::sync::{atomic::*, Arc};
}

#[cfg(all(loom, test))]
pub use self::loom_primitive::*;

mod core_primitive {
    pub use ::core::sync::atomic::*;
    pub use alloc::sync::Arc;
}

#[cfg(not(all(loom, test)))]
pub use self::core_primitive::*;
