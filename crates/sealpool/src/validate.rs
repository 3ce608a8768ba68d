// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Boundary checks gating the write-rare path.
//!
//! Every check fails closed. Empty and wrapping ranges are rejected, as is
//! any address that cannot be classified.

use crate::pool::Pool;
use crate::static_region::StaticRegion;

/// Whether `[addr, addr + len)` satisfies `start <= addr < addr + len <= end`.
#[inline]
pub fn in_range(start: usize, end: usize, addr: usize, len: usize) -> bool {
    match addr.checked_add(len) {
        Some(high) => start <= addr && addr < high && high <= end,
        None => false,
    }
}

/// Whether the range lies inside the installed static write-rare region.
///
/// False when no region is installed.
pub fn in_static_region(addr: usize, len: usize) -> bool {
    StaticRegion::global().is_some_and(|region| region.contains(addr, len))
}

/// Whether the range lies inside one rewritable chunk of `pool`, and the pool
/// still allows write-rare updates.
pub fn in_rewritable_chunk(pool: &Pool, addr: usize, len: usize) -> bool {
    pool.is_rewritable_range(addr, len)
}
