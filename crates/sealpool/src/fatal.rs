// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::error::FatalError;

/// Aborts on a broken protection invariant.
///
/// Returning would let the caller carry on believing memory is protected
/// when it might not be.
#[cold]
#[inline(never)]
pub(crate) fn fatal(error: FatalError) -> ! {
    log::error!("sealpool: {error}, aborting");

    #[cfg(test)]
    std::process::exit(error as i32);

    #[cfg(not(test))]
    unsafe {
        libc::abort()
    }
}
