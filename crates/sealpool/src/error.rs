// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Error types for sealpool.

use thiserror::Error;

use sealpool_pages::PageError;

/// Errors from pool and static region management.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum PoolError {
    /// Alignment is not a power of two, or is larger than a page.
    #[error("invalid alignment {0}: must be a power of two no larger than a page")]
    InvalidAlignment(usize),

    /// Zero-sized allocations and regions are refused.
    #[error("zero-sized request")]
    ZeroSize,

    /// Size arithmetic overflowed.
    #[error("integer overflow: requested size exceeds usize::MAX")]
    Overflow,

    /// The page source could not provide a new chunk.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] PageError),

    /// The pool (or static region) no longer accepts allocations.
    #[error("pool is read-only")]
    ReadOnly,

    /// The initial content could not be written through the write-rare path.
    #[error("initial fill failed: {0}")]
    Fill(#[from] WriteRareError),

    /// A mutex was poisoned.
    #[error("mutex poisoned")]
    MutexPoisoned,
}

/// Reasons a write-rare update is rejected.
///
/// When one of these is returned, no byte of the destination was changed,
/// except for [`WriteRareError::Alias`] (pages before the failing one may
/// already hold the new content).
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum WriteRareError {
    /// The destination is not fully inside write-rare memory.
    #[error("destination is outside write-rare memory")]
    OutOfRange,

    /// The destination belongs to memory that may not be rewritten.
    #[error("destination is not rewritable")]
    NotRewritable,

    /// The source bytes overlap the destination.
    #[error("source overlaps destination")]
    Overlap,

    /// A counter is not aligned for atomic access.
    #[error("destination is misaligned")]
    Misaligned,

    /// Signals could not be blocked around the update.
    #[error("signal mask: {0}")]
    SignalMask(PageError),

    /// A temporary writable mapping could not be established.
    #[error("writable alias: {0}")]
    Alias(PageError),

    /// A mutex was poisoned.
    #[error("mutex poisoned")]
    MutexPoisoned,
}

/// A copy across the trust boundary that must not happen.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum CopyViolation {
    /// The copy would write into pool memory.
    #[error("copy into pool memory at {addr:#x}+{len}")]
    IntoPool {
        /// Destination.
        addr: usize,
        /// Length.
        len: usize,
    },

    /// The copy would write into the static write-rare region.
    #[error("copy into the static region at {addr:#x}+{len}")]
    IntoStaticRegion {
        /// Destination.
        addr: usize,
        /// Length.
        len: usize,
    },

    /// The range touches pool memory without fitting in one chunk.
    #[error("copy range {addr:#x}+{len} is not a valid pool object")]
    OutOfRange {
        /// Start of the range.
        addr: usize,
        /// Length.
        len: usize,
    },
}

/// Internal invariant violations. Never returned: they abort the process.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum FatalError {
    #[error("write-rare verification mismatch")]
    VerificationMismatch = 10,

    #[error("resolved chunk does not contain the destination")]
    ChunkMismatch = 11,

    #[error("failed to write-protect memory")]
    ProtectFailed = 12,

    #[error("chunk still referenced at destruction")]
    ChunkStillReferenced = 13,
}
