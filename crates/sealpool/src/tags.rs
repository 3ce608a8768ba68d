// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! ChunkTags - monotonic protection state of a chunk.
//!
//! Tags only ever move one way: `PROTECTED` is set and never cleared,
//! `REWRITABLE` is cleared and never set. Only destruction resets a chunk.
//! The derived [`Protection`] therefore only moves down the lattice
//! `Writable > WriteRare > ReadOnly`.

use core::sync::atomic::{AtomicU8, Ordering};

const OWNED: u8 = 1 << 0;
const REWRITABLE: u8 = 1 << 1;
const PROTECTED: u8 = 1 << 2;

/// Protection level of a chunk, ordered from most to least permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protection {
    /// Immutable.
    ReadOnly,
    /// Read-only except through the write-rare path.
    WriteRare,
    /// Directly writable.
    Writable,
}

/// Tag set of a chunk. Readable without the owning pool's lock.
#[derive(Debug)]
pub struct ChunkTags(AtomicU8);

impl ChunkTags {
    pub(crate) fn new(rewritable: bool) -> Self {
        let bits = if rewritable { OWNED | REWRITABLE } else { OWNED };

        Self(AtomicU8::new(bits))
    }

    #[inline]
    fn bits(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// Whether the chunk still belongs to a pool.
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.bits() & OWNED != 0
    }

    /// Whether write-rare updates may target the chunk.
    #[inline]
    pub fn is_rewritable(&self) -> bool {
        self.bits() & (OWNED | REWRITABLE) == OWNED | REWRITABLE
    }

    /// Whether the chunk's pages are write-protected.
    #[inline]
    pub fn is_protected(&self) -> bool {
        self.bits() & PROTECTED != 0
    }

    /// Current position in the protection lattice.
    pub fn protection(&self) -> Protection {
        let bits = self.bits();

        if bits & PROTECTED == 0 {
            Protection::Writable
        } else if bits & REWRITABLE != 0 {
            Protection::WriteRare
        } else {
            Protection::ReadOnly
        }
    }

    /// Sets `PROTECTED`. Returns false if it was already set.
    pub(crate) fn mark_protected(&self) -> bool {
        self.0.fetch_or(PROTECTED, Ordering::AcqRel) & PROTECTED == 0
    }

    /// Clears `REWRITABLE`. Returns false if it was already clear.
    pub(crate) fn clear_rewritable(&self) -> bool {
        self.0.fetch_and(!REWRITABLE, Ordering::AcqRel) & REWRITABLE != 0
    }

    /// Drops every tag. Only used when the chunk is released.
    pub(crate) fn disown(&self) {
        self.0.store(0, Ordering::Release);
    }
}
