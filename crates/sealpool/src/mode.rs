// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

/// Protection policy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolMode {
    /// Chunks become immutable on `protect()`.
    ReadOnly,
    /// Chunks become write-rare on `protect()`.
    WriteRare,
    /// Like `ReadOnly`, and every chunk is protected as soon as the pool
    /// grows past it.
    AutoReadOnly,
    /// Like `WriteRare`, and every chunk is protected as soon as the pool
    /// grows past it.
    AutoWriteRare,
    /// Write-rare with every chunk protected on creation. Initial content
    /// goes through the write-rare path.
    StartWriteRare,
}

impl PoolMode {
    /// Whether chunks of this pool are eligible for write-rare updates.
    #[inline]
    pub const fn is_rewritable(self) -> bool {
        matches!(
            self,
            Self::WriteRare | Self::AutoWriteRare | Self::StartWriteRare
        )
    }

    /// Whether growth protects the chunk being retired.
    #[inline]
    pub const fn is_auto(self) -> bool {
        matches!(self, Self::AutoReadOnly | Self::AutoWriteRare)
    }

    /// Whether chunks are protected the moment they are created.
    #[inline]
    pub const fn protects_from_start(self) -> bool {
        matches!(self, Self::StartWriteRare)
    }
}
