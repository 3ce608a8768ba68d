// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use core::sync::atomic::{AtomicUsize, Ordering};

const FALLBACK_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Returns the system page size, queried once and cached.
#[inline]
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);

    if cached != 0 {
        return cached;
    }

    let queried = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let size = if queried > 0 {
        queried as usize
    } else {
        FALLBACK_PAGE_SIZE
    };

    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Rounds `size` up to a whole number of pages. `None` on overflow.
#[inline]
pub fn round_up_to_page(size: usize) -> Option<usize> {
    let mask = page_size() - 1;

    size.checked_add(mask).map(|s| s & !mask)
}
