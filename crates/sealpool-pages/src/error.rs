// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Error types for sealpool-pages.
use thiserror::Error;

/// Errors from page syscalls.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum PageError {
    /// The backing memory file could not be created.
    #[error("memfd_create failed")]
    Memfd = 0,

    /// The backing memory file could not be grown.
    #[error("ftruncate failed")]
    Truncate = 1,

    /// A region could not be mapped.
    #[error("mmap failed")]
    Map = 2,

    /// A region could not be made read-only.
    #[error("mprotect(PROT_READ) failed")]
    Protect = 3,

    /// A region could not be made writable again.
    #[error("mprotect(PROT_READ | PROT_WRITE) failed")]
    Unprotect = 4,

    /// A writable alias of a page could not be mapped.
    #[error("mmap of writable alias failed")]
    Alias = 5,

    /// The thread signal mask could not be changed.
    #[error("pthread_sigmask failed")]
    SignalMask = 6,

    /// A size or file offset does not fit its type.
    #[error("region size overflows")]
    Overflow = 7,

    /// A page index lies past the end of its region.
    #[error("page index outside of region")]
    OutOfBounds = 8,
}
