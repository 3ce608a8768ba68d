// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! MemfdPages - memfd-backed regions with per-page writable aliases.
//!
//! A page source owns one anonymous memory file (`memfd_create`). Every
//! region is a range of that file, grown with `ftruncate` and mapped once
//! `MAP_SHARED` as the primary mapping. Protection toggles the primary
//! mapping with `mprotect`. A write alias maps a single page of the same file
//! again, read-write, at a kernel-chosen address: stores through the alias
//! reach the same physical page while the primary mapping stays read-only.
//!
//! Freed ranges are hole-punched and reused by later allocations, so the
//! file does not grow without bound and reused pages read as zero.

use core::ptr::{self, NonNull};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::PageError;
use crate::page_size::{page_size, round_up_to_page};
use crate::region::{AliasPage, Region};
use crate::traits::{PageSource, WriteAlias};

#[cfg(any(test, feature = "test-utils"))]
use crate::behaviour::PagesBehaviour;

const MEMFD_NAME: &core::ffi::CStr = c"sealpool";

/// The shared memfd and the bookkeeping of its ranges.
#[derive(Debug, Default)]
struct Backing {
    /// Created on first allocation.
    fd: Option<libc::c_int>,
    /// File length in bytes.
    len: usize,
    /// Reusable file ranges: offset -> length.
    free: BTreeMap<usize, usize>,
    /// Live regions: start address -> length in bytes.
    live: BTreeMap<usize, usize>,
}

impl Backing {
    fn fd(&mut self) -> Result<libc::c_int, PageError> {
        if let Some(fd) = self.fd {
            return Ok(fd);
        }

        let fd = unsafe { libc::memfd_create(MEMFD_NAME.as_ptr(), libc::MFD_CLOEXEC) };

        if fd < 0 {
            return Err(PageError::Memfd);
        }

        self.fd = Some(fd);

        Ok(fd)
    }

    /// First fit over the released ranges.
    fn take_free(&mut self, len: usize) -> Option<usize> {
        let (&offset, &available) = self.free.iter().find(|(_, available)| **available >= len)?;

        self.free.remove(&offset);

        if available > len {
            self.free.insert(offset + len, available - len);
        }

        Some(offset)
    }

    /// Appends `len` bytes to the file and returns their offset.
    fn extend(&mut self, fd: libc::c_int, len: usize) -> Result<usize, PageError> {
        let new_len = self.len.checked_add(len).ok_or(PageError::Overflow)?;
        let file_len = libc::off_t::try_from(new_len).map_err(|_| PageError::Overflow)?;

        if unsafe { libc::ftruncate(fd, file_len) } != 0 {
            return Err(PageError::Truncate);
        }

        let offset = self.len;
        self.len = new_len;

        Ok(offset)
    }

    /// Returns a range to the free list, merging it with its neighbours.
    fn release(&mut self, mut offset: usize, mut len: usize) {
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                offset = prev;
                len += prev_len;
            }
        }

        if let Some(next_len) = self.free.remove(&(offset + len)) {
            len += next_len;
        }

        self.free.insert(offset, len);
    }
}

/// Linux page source backed by a single memfd.
#[derive(Debug, Default)]
pub struct MemfdPages {
    backing: Mutex<Backing>,
    #[cfg(any(test, feature = "test-utils"))]
    behaviour: Mutex<PagesBehaviour>,
}

impl MemfdPages {
    /// Creates a page source with no live regions.
    ///
    /// The backing file is created on the first allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of regions allocated and not yet freed.
    pub fn live_regions(&self) -> usize {
        self.backing().live.len()
    }

    /// Changes the failure injection behaviour.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// // test-utils feature required in dev-dependencies
    /// use sealpool_pages::{MemfdPages, PageSource, PagesBehaviour};
    ///
    /// let pages = MemfdPages::new();
    /// pages.change_behaviour(PagesBehaviour::FailAtAlloc);
    /// assert!(pages.alloc_region(1).is_err());
    /// ```
    #[cfg(any(test, feature = "test-utils"))]
    pub fn change_behaviour(&self, behaviour: PagesBehaviour) {
        *self
            .behaviour
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = behaviour;
    }

    fn backing(&self) -> MutexGuard<'_, Backing> {
        self.backing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn injected(&self, check: impl FnOnce(&mut PagesBehaviour) -> bool) -> bool {
        let mut behaviour = self
            .behaviour
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        check(&mut behaviour)
    }

    fn protect(&self, region: &Region, prot: libc::c_int) -> bool {
        unsafe { libc::mprotect(region.addr().as_ptr().cast(), region.len(), prot) == 0 }
    }
}

impl PageSource for MemfdPages {
    fn alloc_region(&self, size: usize) -> Result<Region, PageError> {
        #[cfg(any(test, feature = "test-utils"))]
        if self.injected(|b| *b == PagesBehaviour::FailAtAlloc) {
            return Err(PageError::Map);
        }

        let len = round_up_to_page(size.max(1)).ok_or(PageError::Overflow)?;

        let mut backing = self.backing();
        let fd = backing.fd()?;

        let offset = match backing.take_free(len) {
            Some(offset) => offset,
            None => backing.extend(fd, len)?,
        };

        let Ok(file_offset) = libc::off_t::try_from(offset) else {
            backing.release(offset, len);
            return Err(PageError::Overflow);
        };

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                file_offset,
            )
        };

        let addr = if addr == libc::MAP_FAILED {
            None
        } else {
            NonNull::new(addr.cast::<u8>())
        };

        let Some(addr) = addr else {
            backing.release(offset, len);
            return Err(PageError::Map);
        };

        let region = unsafe { Region::from_raw_parts(addr, len / page_size(), offset) };
        backing.live.insert(region.start(), len);

        log::trace!(
            "mapped {} pages at {:#x} (file offset {:#x})",
            region.pages(),
            region.start(),
            offset
        );

        Ok(region)
    }

    fn free_region(&self, region: Region) {
        let mut backing = self.backing();
        backing.live.remove(&region.start());

        unsafe { libc::munmap(region.addr().as_ptr().cast(), region.len()) };

        let punched = match (
            backing.fd,
            libc::off_t::try_from(region.offset()),
            libc::off_t::try_from(region.len()),
        ) {
            (Some(fd), Ok(offset), Ok(len)) => unsafe {
                libc::fallocate(
                    fd,
                    libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                    offset,
                    len,
                ) == 0
            },
            _ => false,
        };

        // A range that still holds old data is never handed out again.
        if punched {
            backing.release(region.offset(), region.len());
        } else {
            log::warn!(
                "could not release file range {:#x}+{:#x}, leaking it",
                region.offset(),
                region.len()
            );
        }

        log::trace!("unmapped {} pages at {:#x}", region.pages(), region.start());
    }

    fn set_readonly(&self, region: &Region) -> Result<(), PageError> {
        #[cfg(any(test, feature = "test-utils"))]
        if self.injected(|b| *b == PagesBehaviour::FailAtProtect) {
            return Err(PageError::Protect);
        }

        if !self.protect(region, libc::PROT_READ) {
            return Err(PageError::Protect);
        }

        Ok(())
    }

    fn set_writable(&self, region: &Region) -> Result<(), PageError> {
        if !self.protect(region, libc::PROT_READ | libc::PROT_WRITE) {
            return Err(PageError::Unprotect);
        }

        Ok(())
    }

    fn owns(&self, addr: usize) -> bool {
        self.backing()
            .live
            .range(..=addr)
            .next_back()
            .is_some_and(|(start, len)| addr < start + len)
    }
}

impl WriteAlias for MemfdPages {
    fn map_writable(&self, region: &Region, index: usize) -> Result<AliasPage, PageError> {
        #[cfg(any(test, feature = "test-utils"))]
        if self.injected(|b| match b {
            PagesBehaviour::FailAtAlias => true,
            PagesBehaviour::FailAtAliasAfter(0) => true,
            PagesBehaviour::FailAtAliasAfter(n) => {
                *n -= 1;
                false
            }
            _ => false,
        }) {
            return Err(PageError::Alias);
        }

        if index >= region.pages() {
            return Err(PageError::OutOfBounds);
        }

        let fd = self.backing().fd.ok_or(PageError::Alias)?;

        let page = page_size();
        let offset = index
            .checked_mul(page)
            .and_then(|within| region.offset().checked_add(within))
            .and_then(|offset| libc::off_t::try_from(offset).ok())
            .ok_or(PageError::Overflow)?;

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                page,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(PageError::Alias);
        }

        let addr = NonNull::new(addr.cast::<u8>()).ok_or(PageError::Alias)?;

        Ok(unsafe { AliasPage::from_raw_parts(addr, page) })
    }

    fn unmap(&self, alias: AliasPage) {
        unsafe { libc::munmap(alias.as_ptr().cast(), alias.len()) };
    }
}

impl Drop for MemfdPages {
    fn drop(&mut self) {
        let backing = self
            .backing
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        // Mappings that are still live keep the file alive on their own.
        if let Some(fd) = backing.fd.take() {
            unsafe { libc::close(fd) };
        }
    }
}
