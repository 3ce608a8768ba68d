// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Region and AliasPage - spans handed out by a page source.

use core::ptr::NonNull;

use crate::page_size::page_size;

/// A virtually contiguous, page-aligned span of pages.
///
/// `offset` is where the span starts in the backing object. For
/// [`MemfdPages`](crate::MemfdPages) it is the byte offset inside the shared
/// memfd, which is what lets a second mapping of the same physical pages be
/// created later.
#[derive(Debug)]
pub struct Region {
    addr: NonNull<u8>,
    pages: usize,
    offset: usize,
}

// Safety: a Region is a description of a mapping; access goes through raw pointers.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Describes `pages` pages mapped at `addr`.
    ///
    /// # Safety
    /// `addr` must be page aligned and the mapping must stay valid until the
    /// region is handed back to the source that created it.
    pub unsafe fn from_raw_parts(addr: NonNull<u8>, pages: usize, offset: usize) -> Self {
        debug_assert_eq!(addr.as_ptr() as usize % page_size(), 0);

        Self {
            addr,
            pages,
            offset,
        }
    }

    /// First byte of the region.
    pub fn addr(&self) -> NonNull<u8> {
        self.addr
    }

    /// Start address as an integer.
    pub fn start(&self) -> usize {
        self.addr.as_ptr() as usize
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.start() + self.len()
    }

    /// Number of pages.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.pages * page_size()
    }

    /// Returns true if the region spans no pages.
    pub fn is_empty(&self) -> bool {
        self.pages == 0
    }

    /// Byte offset of the first page in the backing object.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Index of the page holding `addr`, if `addr` lies inside the region.
    pub fn page_index_of(&self, addr: usize) -> Option<usize> {
        if addr < self.start() || addr >= self.end() {
            return None;
        }

        Some((addr - self.start()) / page_size())
    }
}

/// A temporary writable mapping of exactly one page.
#[derive(Debug)]
pub struct AliasPage {
    ptr: NonNull<u8>,
    len: usize,
}

impl AliasPage {
    /// Describes a one-page alias mapped at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to `len` writable bytes that stay mapped until the
    /// alias is handed back to the capability that created it.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Start of the writable alias.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length of the alias in bytes (one page).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the alias maps nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
