// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

/// Test behaviour for injecting failures in [`MemfdPages`](crate::MemfdPages).
///
/// This is only available with the `test-utils` feature and allows users
/// to exercise error paths that real syscalls almost never take.
///
/// The behaviour is sticky - once set, it remains active until changed.
///
/// # Example
///
/// ```rust,ignore
/// // test-utils feature required in dev-dependencies
/// fn example() {
///     use sealpool_pages::{MemfdPages, PageSource, PagesBehaviour};
///
///     let pages = MemfdPages::new();
///     pages.change_behaviour(PagesBehaviour::FailAtAlloc);
///     assert!(pages.alloc_region(1).is_err());
///
///     pages.change_behaviour(PagesBehaviour::None);
///     let region = pages.alloc_region(1).expect("Failed to alloc_region(..)");
///     pages.free_region(region);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagesBehaviour {
    /// Normal behaviour - no injected failures.
    #[default]
    None,
    /// `alloc_region()` fails with `PageError::Map`.
    FailAtAlloc,
    /// `set_readonly()` fails with `PageError::Protect`.
    FailAtProtect,
    /// `map_writable()` fails with `PageError::Alias`.
    FailAtAlias,
    /// The next `n` calls to `map_writable()` succeed, later ones fail.
    FailAtAliasAfter(usize),
}
