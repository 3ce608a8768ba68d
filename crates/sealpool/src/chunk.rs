// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Chunk tracking: the regions backing pools and the lookups over them.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use sealpool_pages::Region;

use crate::tags::ChunkTags;

/// One region of pages backing part of a pool.
#[derive(Debug)]
pub struct Chunk {
    region: Region,
    tags: ChunkTags,
}

impl Chunk {
    pub(crate) fn new(region: Region, rewritable: bool) -> Self {
        Self {
            region,
            tags: ChunkTags::new(rewritable),
        }
    }

    /// Start address.
    pub fn start(&self) -> usize {
        self.region.start()
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.region.end()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Returns true if the chunk spans no bytes.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Protection tags.
    pub fn tags(&self) -> &ChunkTags {
        &self.tags
    }

    pub(crate) fn region(&self) -> &Region {
        &self.region
    }

    pub(crate) fn into_region(self) -> Region {
        self.region
    }

    /// Where `[addr, addr + len)` lies relative to this chunk.
    pub fn span(&self, addr: usize, len: usize) -> Span {
        span_of(self.start(), self.end(), addr, len)
    }
}

/// Position of a byte range relative to a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// No byte of the range is in the chunk.
    Outside,
    /// Every byte of the range is in the chunk.
    Inside,
    /// The range crosses a boundary of the chunk, or wraps the address space.
    Straddles,
}

pub(crate) fn span_of(start: usize, end: usize, addr: usize, len: usize) -> Span {
    let Some(high) = addr.checked_add(len) else {
        // A wrapping range is never legitimate; report it if it touches us.
        return if addr < end { Span::Straddles } else { Span::Outside };
    };

    if start <= addr && high <= end && addr < end {
        Span::Inside
    } else if addr < end && high > start {
        Span::Straddles
    } else {
        Span::Outside
    }
}

/// Finds the chunk holding the whole of `[addr, addr + len)`.
///
/// A range that only partially overlaps a chunk, or spans two chunks, is
/// rejected: `None` rather than a chunk the write would escape from.
pub(crate) fn find_chunk_containing(
    chunks: &[Arc<Chunk>],
    addr: usize,
    len: usize,
) -> Option<&Arc<Chunk>> {
    let mut found = None;

    for chunk in chunks {
        match chunk.span(addr, len) {
            Span::Outside => {}
            Span::Inside => found = Some(chunk),
            Span::Straddles => {
                log::warn!(
                    "range {addr:#x}+{len} crosses chunk [{:#x}, {:#x})",
                    chunk.start(),
                    chunk.end()
                );
                return None;
            }
        }
    }

    found
}

/// Result of asking whether a range belongs to allocator memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    /// The range does not touch any tracked chunk.
    NotOurs,
    /// The range lies fully inside one owned chunk.
    Valid,
    /// The range touches a chunk but is not fully inside it.
    OutOfRange,
}

static GLOBAL: LazyLock<Arc<ChunkTracker>> = LazyLock::new(|| Arc::new(ChunkTracker::new()));

/// Registry of every chunk handed out by the pools sharing it.
///
/// Pools register a chunk when it is created and remove it when the pool is
/// destroyed. Membership queries run under a read lock and never hand out
/// references to chunks.
#[derive(Debug, Default)]
pub struct ChunkTracker {
    chunks: RwLock<BTreeMap<usize, Arc<Chunk>>>,
}

impl ChunkTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide tracker used by pools that are not given one.
    pub fn global() -> Arc<ChunkTracker> {
        Arc::clone(&GLOBAL)
    }

    pub(crate) fn register(&self, chunk: Arc<Chunk>) {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk.start(), chunk);
    }

    pub(crate) fn unregister(&self, start: usize) -> Option<Arc<Chunk>> {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&start)
    }

    /// Number of chunks currently tracked.
    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no chunk is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classifies `[addr, addr + len)` against every tracked chunk.
    ///
    /// Copy hardening uses this to tell a legitimate allocator object from a
    /// range that touches allocator memory without fitting in one chunk.
    pub fn check_object(&self, addr: usize, len: usize) -> ObjectStatus {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);

        // The chunk starting at or before addr.
        if let Some((_, chunk)) = chunks.range(..=addr).next_back() {
            match chunk.span(addr, len) {
                Span::Inside if chunk.tags().is_owned() => return ObjectStatus::Valid,
                Span::Inside | Span::Straddles => return ObjectStatus::OutOfRange,
                Span::Outside => {}
            }
        }

        // A chunk starting after addr but still reached by the range.
        let reaches_next = match addr.checked_add(len) {
            Some(high) if high > addr => chunks.range(addr + 1..high).next().is_some(),
            Some(_) => false,
            None => chunks.range(addr.saturating_add(1)..).next().is_some(),
        };

        if reaches_next {
            ObjectStatus::OutOfRange
        } else {
            ObjectStatus::NotOurs
        }
    }
}
