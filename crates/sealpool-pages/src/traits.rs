// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::error::PageError;
use crate::region::{AliasPage, Region};

/// Source of page-aligned regions with a read-only/read-write toggle.
pub trait PageSource: Send + Sync + core::fmt::Debug {
    /// Allocates at least `size` bytes, rounded up to whole pages.
    fn alloc_region(&self, size: usize) -> Result<Region, PageError>;

    /// Returns a region to the source. Works regardless of its protection.
    fn free_region(&self, region: Region);

    /// Makes every page of the region read-only through its primary mapping.
    fn set_readonly(&self, region: &Region) -> Result<(), PageError>;

    /// Makes every page of the region read-write through its primary mapping.
    fn set_writable(&self, region: &Region) -> Result<(), PageError>;

    /// Returns true if `addr` lies inside a region this source still has live.
    fn owns(&self, addr: usize) -> bool;
}

/// Capability to write a page whose primary mapping is read-only.
///
/// Implementations hand out a second, writable mapping of the same physical
/// page at a different virtual address. The alias must only live for the
/// duration of a single page update.
pub trait WriteAlias: Send + Sync {
    /// Maps page `index` of `region` writable at a fresh address.
    fn map_writable(&self, region: &Region, index: usize) -> Result<AliasPage, PageError>;

    /// Tears down an alias created by [`map_writable`](Self::map_writable).
    fn unmap(&self, alias: AliasPage);
}

/// A page source that also provides the write alias capability.
pub trait Pages: PageSource + WriteAlias {}

impl<T: PageSource + WriteAlias + ?Sized> Pages for T {}
