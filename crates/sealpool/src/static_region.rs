// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Write-rare region for data that lives as long as the process.
//!
//! Values are placed into the region during setup, then the whole region is
//! sealed read-only. After sealing the only way to change them is
//! [`StaticRegion::write_rare`] (or the typed writers of
//! [`RareWrite`](crate::RareWrite)).
//!
//! One region can be installed as the process-wide region, which is what the
//! copy hardening checks and [`in_static_region`](crate::in_static_region)
//! consult.

use core::mem::{ManuallyDrop, size_of};
use core::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use sealpool_pages::{PageError, Pages, Region, page_size};

use crate::engine::{WriteOp, add_counter, write_pages};
use crate::error::{FatalError, PoolError, WriteRareError};
use crate::fatal::fatal;
use crate::validate::in_range;

static INSTALLED: OnceLock<StaticRegion> = OnceLock::new();

/// A page-aligned region sealed once and then updated through write-rare only.
pub struct StaticRegion {
    region: ManuallyDrop<Region>,
    pages: Arc<dyn Pages>,
    /// Bytes already handed out by `place()`. Also serializes updates.
    cursor: Mutex<usize>,
    sealed: AtomicBool,
}

impl StaticRegion {
    /// Reserves `page_count` pages from the default page source.
    #[cfg(target_os = "linux")]
    pub fn reserve(page_count: usize) -> Result<Self, PoolError> {
        Self::with_pages(crate::default_pages(), page_count)
    }

    /// Reserves `page_count` pages from `pages`.
    pub fn with_pages(pages: Arc<dyn Pages>, page_count: usize) -> Result<Self, PoolError> {
        if page_count == 0 {
            return Err(PoolError::ZeroSize);
        }

        let size = page_count
            .checked_mul(page_size())
            .ok_or(PoolError::Overflow)?;
        let region = pages.alloc_region(size)?;

        log::debug!(
            "static region reserved: {} bytes at {:#x}",
            region.len(),
            region.start()
        );

        Ok(Self {
            region: ManuallyDrop::new(region),
            pages,
            cursor: Mutex::new(0),
            sealed: AtomicBool::new(false),
        })
    }

    /// First address of the region.
    pub fn start(&self) -> usize {
        self.region.start()
    }

    /// One past the last address.
    pub fn end(&self) -> usize {
        self.region.end()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Returns true if the region spans no bytes.
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Whether `[addr, addr + len)` lies fully inside the region.
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        in_range(self.start(), self.end(), addr, len)
    }

    /// Whether the region has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Reserves `size` bytes aligned to `align` for a value set up before
    /// sealing. Placement is refused once the region is sealed.
    pub fn place(&self, size: usize, align: usize) -> Result<NonNull<u8>, PoolError> {
        let mut cursor = self.cursor.lock().map_err(|_| PoolError::MutexPoisoned)?;

        self.reserve_at(&mut cursor, size, align)
    }

    /// Places `value` and returns a pointer to it.
    pub fn place_value<T: Copy>(&self, value: T) -> Result<NonNull<T>, PoolError> {
        let mut cursor = self.cursor.lock().map_err(|_| PoolError::MutexPoisoned)?;

        let slot = self
            .reserve_at(&mut cursor, size_of::<T>(), align_of::<T>())?
            .cast::<T>();

        // Sealing needs the cursor lock, so the page is still writable.
        unsafe { slot.as_ptr().write(value) };

        Ok(slot)
    }

    fn reserve_at(
        &self,
        cursor: &mut usize,
        size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        if !align.is_power_of_two() || align > page_size() {
            return Err(PoolError::InvalidAlignment(align));
        }

        if self.is_sealed() {
            log::warn!("placement of {size} bytes in a sealed static region");
            return Err(PoolError::ReadOnly);
        }

        let offset = cursor.checked_add(align - 1).ok_or(PoolError::Overflow)? & !(align - 1);
        let next = offset.checked_add(size).ok_or(PoolError::Overflow)?;

        if next > self.len() {
            return Err(PoolError::OutOfMemory(PageError::OutOfBounds));
        }

        *cursor = next;

        NonNull::new((self.start() + offset) as *mut u8).ok_or(PoolError::Overflow)
    }

    /// Makes the region read-only. Sealing twice is logged and ignored.
    pub fn seal(&self) {
        let _cursor = self
            .cursor
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if self.is_sealed() {
            log::warn!("static region already sealed");
            return;
        }

        if let Err(e) = self.pages.set_readonly(&self.region) {
            log::error!("sealing static region failed: {e}");
            fatal(FatalError::ProtectFailed);
        }

        self.sealed.store(true, Ordering::Release);

        log::debug!("static region sealed at {:#x}", self.start());
    }

    /// Copies `src` over the region at `dst`.
    pub fn write_rare(&self, dst: *const u8, src: &[u8]) -> Result<(), WriteRareError> {
        self.update(dst as usize, src.len(), WriteOp::Copy(src))
    }

    /// Sets `len` bytes of the region at `dst` to `byte`.
    pub fn fill_rare(&self, dst: *const u8, byte: u8, len: usize) -> Result<(), WriteRareError> {
        self.update(dst as usize, len, WriteOp::Fill(byte))
    }

    /// Atomically adds `delta` to the counter at `dst` and returns the new
    /// value.
    pub fn add_rare(&self, dst: *const AtomicIsize, delta: isize) -> Result<isize, WriteRareError> {
        let dst = dst as usize;

        if !self.contains(dst, size_of::<AtomicIsize>()) {
            log::warn!("counter update on invalid static address {dst:#x}");
            return Err(WriteRareError::OutOfRange);
        }

        let _cursor = self
            .cursor
            .lock()
            .map_err(|_| WriteRareError::MutexPoisoned)?;

        add_counter(&*self.pages, &self.region, dst, delta)
    }

    fn update(&self, dst: usize, len: usize, op: WriteOp<'_>) -> Result<(), WriteRareError> {
        if !self.contains(dst, len) {
            log::warn!("write rare on invalid static range {dst:#x}+{len}");
            return Err(WriteRareError::OutOfRange);
        }

        op.check_overlap(dst, len)?;

        let _cursor = self
            .cursor
            .lock()
            .map_err(|_| WriteRareError::MutexPoisoned)?;

        write_pages(&*self.pages, &self.region, dst, len, op)
    }

    /// Makes `region` the process-wide static region.
    ///
    /// Only one region can ever be installed; later calls hand the region
    /// back.
    pub fn install(region: StaticRegion) -> Result<&'static StaticRegion, StaticRegion> {
        INSTALLED.set(region)?;

        match INSTALLED.get() {
            Some(installed) => {
                log::debug!("static region installed at {:#x}", installed.start());
                Ok(installed)
            }
            None => unreachable!("OnceLock::set succeeded"),
        }
    }

    /// The process-wide static region, if one has been installed.
    pub fn global() -> Option<&'static StaticRegion> {
        INSTALLED.get()
    }
}

impl Drop for StaticRegion {
    fn drop(&mut self) {
        if self.is_sealed() {
            if let Err(e) = self.pages.set_writable(&self.region) {
                log::warn!("could not unseal static region: {e}");
            }
        }

        // SAFETY: the region is taken once, here, and never used again.
        let region = unsafe { ManuallyDrop::take(&mut self.region) };
        self.pages.free_region(region);
    }
}

impl core::fmt::Debug for StaticRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StaticRegion")
            .field("start", &format_args!("{:#x}", self.start()))
            .field("len", &self.len())
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}
