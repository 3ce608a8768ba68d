// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Pool - a protectable bump arena.
//!
//! A pool owns a list of chunks obtained from a [`Pages`] source. Allocations
//! are carved from the top of the newest chunk downwards. When that chunk is
//! missing, closed by protection or too full, a new chunk of at least
//! `max(size, refill)` bytes is added. Memory is never returned to the
//! pool: chunks are only released when the whole pool is destroyed.
//!
//! # Protection
//!
//! | Mode | New chunk | On growth | `protect()` |
//! |---|---|---|---|
//! | `ReadOnly` | writable | - | read-only |
//! | `WriteRare` | writable, rewritable | - | write-rare |
//! | `AutoReadOnly` | writable | retire -> read-only | read-only |
//! | `AutoWriteRare` | writable, rewritable | retire -> write-rare | write-rare |
//! | `StartWriteRare` | write-rare | - | no-op |
//!
//! `make_read_only()` moves every chunk to read-only and closes the pool for
//! good.
//!
//! # Safety contract
//!
//! Allocations are handed out as raw pointers. Reading them is up to the
//! caller, and so is not using them after the pool is destroyed. Write-rare
//! updates are validated against the pool's chunks and never touch memory
//! outside them; the caller must not hold Rust references across an update to
//! the same bytes.

use core::ffi::CStr;
use core::mem::size_of;
use core::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use sealpool_pages::{Pages, page_size, round_up_to_page};

use crate::chunk::{Chunk, ChunkTracker, find_chunk_containing};
use crate::engine::{WriteOp, add_counter, write_pages};
use crate::error::{FatalError, PoolError, WriteRareError};
use crate::fatal::fatal;
use crate::mode::PoolMode;

/// Refill value meaning "one page".
pub const DEFAULT_REFILL: usize = 0;

/// Default allocation alignment.
pub const DEFAULT_ALIGN: usize = core::mem::align_of::<usize>();

/// Policy parameters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Minimum growth increment in bytes. Rounded up to whole pages.
    pub refill: usize,
    /// Alignment of every allocation. Power of two, at most one page.
    pub align: usize,
    /// Protection mode.
    pub mode: PoolMode,
}

impl PoolConfig {
    /// Default refill and alignment for `mode`.
    pub fn new(mode: PoolMode) -> Self {
        Self {
            refill: DEFAULT_REFILL,
            align: DEFAULT_ALIGN,
            mode,
        }
    }

    /// Sets the refill size.
    pub fn with_refill(mut self, refill: usize) -> Self {
        self.refill = refill;
        self
    }

    /// Sets the alignment.
    pub fn with_align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }
}

/// Initial content written while the allocation is still exclusive.
#[derive(Debug, Clone, Copy)]
enum Init<'a> {
    None,
    Zero,
    Copy(&'a [u8]),
}

#[derive(Debug)]
struct PoolState {
    /// Oldest first; the newest chunk is the one being carved.
    chunks: Vec<Arc<Chunk>>,
    /// Bytes still free at the bottom of the newest chunk.
    offset: usize,
    /// Whether the newest chunk still accepts allocations.
    open: bool,
    /// Set by `make_read_only()`; the pool never allocates again.
    read_only: bool,
}

/// A protectable memory pool.
pub struct Pool {
    state: Mutex<PoolState>,
    config: PoolConfig,
    /// Pool-level write-rare policy; cleared for good by `make_read_only()`.
    rewritable: AtomicBool,
    pages: Arc<dyn Pages>,
    tracker: Arc<ChunkTracker>,
}

impl Pool {
    /// Creates a pool backed by the default page source and tracker.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sealpool::{Pool, PoolMode, RareWrite};
    ///
    /// fn example() -> Result<(), Box<dyn std::error::Error>> {
    ///     let pool = Pool::create(0, 8, PoolMode::WriteRare)?;
    ///
    ///     let counter = pool.allocate(8)?.cast::<u64>();
    ///     unsafe { counter.as_ptr().write(1) };
    ///
    ///     pool.protect()?;
    ///
    ///     // Direct stores would fault now. Updates go through write-rare.
    ///     pool.write_u64(counter.as_ptr(), 2)?;
    ///     assert_eq!(unsafe { counter.as_ptr().read_volatile() }, 2);
    ///
    ///     pool.destroy();
    ///     Ok(())
    /// }
    /// # example().unwrap();
    /// ```
    #[cfg(target_os = "linux")]
    pub fn create(refill: usize, align: usize, mode: PoolMode) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig {
            refill,
            align,
            mode,
        })
    }

    /// Creates a pool with default refill and alignment.
    #[cfg(target_os = "linux")]
    pub fn with_mode(mode: PoolMode) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new(mode))
    }

    /// Creates a pool from `config`, backed by the default page source and tracker.
    #[cfg(target_os = "linux")]
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_pages(config, crate::default_pages(), ChunkTracker::global())
    }

    /// Creates a pool on an explicit page source and tracker.
    ///
    /// No chunk is allocated until the first request.
    pub fn with_pages(
        config: PoolConfig,
        pages: Arc<dyn Pages>,
        tracker: Arc<ChunkTracker>,
    ) -> Result<Self, PoolError> {
        if !config.align.is_power_of_two() || config.align > page_size() {
            log::warn!("refusing pool with alignment {}", config.align);
            return Err(PoolError::InvalidAlignment(config.align));
        }

        let refill = round_up_to_page(config.refill.max(1)).ok_or(PoolError::Overflow)?;

        Ok(Self {
            state: Mutex::new(PoolState {
                chunks: Vec::new(),
                offset: 0,
                open: false,
                read_only: false,
            }),
            config: PoolConfig { refill, ..config },
            rewritable: AtomicBool::new(config.mode.is_rewritable()),
            pages,
            tracker,
        })
    }

    /// Protection mode.
    pub fn mode(&self) -> PoolMode {
        self.config.mode
    }

    /// Effective configuration (refill rounded to pages).
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Number of chunks owned by the pool.
    pub fn chunk_count(&self) -> usize {
        self.lock().map(|state| state.chunks.len()).unwrap_or(0)
    }

    /// Whether the pool owns chunks and all of them are protected.
    pub fn is_protected(&self) -> bool {
        self.lock()
            .map(|state| {
                !state.chunks.is_empty() && state.chunks.iter().all(|c| c.tags().is_protected())
            })
            .unwrap_or(false)
    }

    /// Whether `make_read_only()` has been called.
    pub fn is_read_only(&self) -> bool {
        self.lock().map(|state| state.read_only).unwrap_or(true)
    }

    /// Protection of every chunk, oldest first.
    #[cfg(test)]
    pub(crate) fn protections(&self) -> Vec<crate::tags::Protection> {
        self.lock()
            .map(|state| state.chunks.iter().map(|c| c.tags().protection()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, PoolError> {
        self.state.lock().map_err(|_| PoolError::MutexPoisoned)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocates `size` bytes aligned to the pool's alignment.
    ///
    /// The content is whatever the chunk held: zero for fresh chunks.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate_with(size, Init::None)
    }

    /// Allocates `size` zeroed bytes.
    pub fn zalloc(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.allocate_with(size, Init::Zero)
    }

    /// Allocates an array of `n` elements of `size` bytes.
    pub fn allocate_array(&self, n: usize, size: usize) -> Result<NonNull<u8>, PoolError> {
        let total = n.checked_mul(size).ok_or(PoolError::Overflow)?;

        self.allocate_with(total, Init::None)
    }

    /// Allocates a zeroed array of `n` elements of `size` bytes.
    pub fn calloc(&self, n: usize, size: usize) -> Result<NonNull<u8>, PoolError> {
        let total = n.checked_mul(size).ok_or(PoolError::Overflow)?;

        self.allocate_with(total, Init::Zero)
    }

    /// Allocates a copy of `bytes`.
    pub fn duplicate(&self, bytes: &[u8]) -> Result<NonNull<u8>, PoolError> {
        self.allocate_with(bytes.len(), Init::Copy(bytes))
    }

    /// Allocates a copy of `s`, NUL terminator included.
    pub fn strdup(&self, s: &CStr) -> Result<NonNull<u8>, PoolError> {
        self.duplicate(s.to_bytes_with_nul())
    }

    /// Grows the pool by one chunk of at least `size` bytes ahead of time.
    ///
    /// Later allocations that fit are served without calling into the page
    /// source.
    pub fn expand(&self, size: usize) -> Result<(), PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        let mut state = self.lock()?;

        if state.read_only {
            log::warn!("expand of {size} bytes on a read-only pool");
            return Err(PoolError::ReadOnly);
        }

        self.grow(&mut state, size)
    }

    fn allocate_with(&self, size: usize, init: Init<'_>) -> Result<NonNull<u8>, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        let mut state = self.lock()?;

        if state.read_only {
            log::warn!("allocation of {size} bytes from a read-only pool");
            return Err(PoolError::ReadOnly);
        }

        let addr = match self.carve(&mut state, size) {
            Some(addr) => addr,
            None => {
                self.grow(&mut state, size)?;
                // A fresh chunk holds at least `size` bytes and starts on a
                // page boundary, so it always fits.
                self.carve(&mut state, size).ok_or(PoolError::Overflow)?
            }
        };

        self.initialize(&state, addr, size, init)?;

        NonNull::new(addr as *mut u8).ok_or(PoolError::Overflow)
    }

    /// Reserves `size` bytes from the top of the free space in the newest chunk.
    fn carve(&self, state: &mut PoolState, size: usize) -> Option<usize> {
        if !state.open {
            return None;
        }

        let chunk = state.chunks.last()?;
        let top = chunk.start() + state.offset;
        let addr = top.checked_sub(size)? & !(self.config.align - 1);

        if addr < chunk.start() {
            return None;
        }

        state.offset = addr - chunk.start();

        Some(addr)
    }

    /// Adds a chunk of at least `max(size, refill)` bytes.
    ///
    /// The pool is left untouched if the page source fails.
    fn grow(&self, state: &mut PoolState, size: usize) -> Result<(), PoolError> {
        let wanted = size.max(self.config.refill);

        let region = self.pages.alloc_region(wanted).map_err(|e| {
            log::warn!("could not add {wanted} bytes to pool: {e}");
            PoolError::OutOfMemory(e)
        })?;

        if self.config.mode.is_auto() {
            if let Some(retired) = state.chunks.last() {
                self.protect_chunk(retired);
            }
        }

        let chunk = Arc::new(Chunk::new(
            region,
            self.rewritable.load(Ordering::Acquire),
        ));

        if self.config.mode.protects_from_start() {
            self.protect_chunk(&chunk);
        }

        log::debug!(
            "pool grew by {} bytes at {:#x} ({:?})",
            chunk.len(),
            chunk.start(),
            chunk.tags().protection()
        );

        self.tracker.register(Arc::clone(&chunk));
        state.offset = chunk.len();
        state.open = true;
        state.chunks.push(chunk);

        Ok(())
    }

    fn initialize(
        &self,
        state: &PoolState,
        addr: usize,
        size: usize,
        init: Init<'_>,
    ) -> Result<(), PoolError> {
        let op = match init {
            Init::None => return Ok(()),
            Init::Zero => WriteOp::Fill(0),
            Init::Copy(bytes) => WriteOp::Copy(bytes),
        };

        if self.config.mode.protects_from_start() {
            return Ok(self.write_locked(state, addr, size, op)?);
        }

        // The newest chunk is writable until protect() or growth, and both
        // need the lock we are holding.
        unsafe {
            match op {
                WriteOp::Fill(byte) => ptr::write_bytes(addr as *mut u8, byte, size),
                WriteOp::Copy(bytes) => {
                    ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, size)
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // Protection
    // =========================================================================

    /// Write-protects every chunk. The current chunk stops serving
    /// allocations; a later allocation grows a fresh, writable chunk.
    /// Pools in `StartWriteRare` mode are always protected, so for them this
    /// does nothing.
    ///
    /// Protecting an already protected pool changes nothing and is logged.
    pub fn protect(&self) -> Result<(), PoolError> {
        let mut state = self.lock()?;

        let newly = state
            .chunks
            .iter()
            .filter(|chunk| self.protect_chunk(chunk))
            .count();

        if self.config.mode.protects_from_start() {
            return Ok(());
        }

        if newly == 0 && !state.chunks.is_empty() {
            log::warn!("pool already protected");
        }

        state.open = false;

        Ok(())
    }

    /// Turns a write-rare pool into a read-only one, permanently.
    ///
    /// Every chunk loses its rewritable tag and is protected; the pool stops
    /// accepting allocations.
    pub fn make_read_only(&self) -> Result<(), PoolError> {
        let mut state = self.lock()?;

        if state.read_only {
            log::warn!("pool already read-only");
            return Ok(());
        }

        self.rewritable.store(false, Ordering::Release);

        for chunk in &state.chunks {
            chunk.tags().clear_rewritable();
            self.protect_chunk(chunk);
        }

        state.open = false;
        state.read_only = true;

        log::debug!("pool made read-only ({} chunks)", state.chunks.len());

        Ok(())
    }

    /// Protects one chunk. Returns false if it already was.
    ///
    /// The tag is set only after the pages really are read-only.
    fn protect_chunk(&self, chunk: &Chunk) -> bool {
        if chunk.tags().is_protected() {
            return false;
        }

        if let Err(e) = self.pages.set_readonly(chunk.region()) {
            log::error!("mprotect of chunk {:#x} failed: {e}", chunk.start());
            fatal(FatalError::ProtectFailed);
        }

        chunk.tags().mark_protected()
    }

    // =========================================================================
    // Write rare
    // =========================================================================

    /// Copies `src` over write-rare memory at `dst`.
    pub fn write_rare(&self, dst: *const u8, src: &[u8]) -> Result<(), WriteRareError> {
        let state = self.state.lock().map_err(|_| WriteRareError::MutexPoisoned)?;

        self.write_locked(&state, dst as usize, src.len(), WriteOp::Copy(src))
    }

    /// Sets `len` bytes of write-rare memory at `dst` to `byte`.
    pub fn fill_rare(&self, dst: *const u8, byte: u8, len: usize) -> Result<(), WriteRareError> {
        let state = self.state.lock().map_err(|_| WriteRareError::MutexPoisoned)?;

        self.write_locked(&state, dst as usize, len, WriteOp::Fill(byte))
    }

    /// Atomically adds `delta` to the write-rare counter at `dst` and returns
    /// the new value.
    pub fn add_rare(&self, dst: *const AtomicIsize, delta: isize) -> Result<isize, WriteRareError> {
        let dst = dst as usize;
        let state = self.state.lock().map_err(|_| WriteRareError::MutexPoisoned)?;
        let chunk = self.rewritable_chunk(&state, dst, size_of::<AtomicIsize>())?;

        add_counter(&*self.pages, chunk.region(), dst, delta)
    }

    fn write_locked(
        &self,
        state: &PoolState,
        dst: usize,
        len: usize,
        op: WriteOp<'_>,
    ) -> Result<(), WriteRareError> {
        let chunk = self.rewritable_chunk(state, dst, len)?;

        op.check_overlap(dst, len)?;

        write_pages(&*self.pages, chunk.region(), dst, len, op)
    }

    /// The chunk that may legitimately be rewritten at `[dst, dst + len)`.
    fn rewritable_chunk<'s>(
        &self,
        state: &'s PoolState,
        dst: usize,
        len: usize,
    ) -> Result<&'s Arc<Chunk>, WriteRareError> {
        if !self.rewritable.load(Ordering::Acquire) {
            log::warn!("write rare of {len} bytes at {dst:#x} on a non write-rare pool");
            return Err(WriteRareError::NotRewritable);
        }

        if len == 0 {
            log::warn!("empty write rare at {dst:#x}");
            return Err(WriteRareError::OutOfRange);
        }

        let Some(chunk) = find_chunk_containing(&state.chunks, dst, len) else {
            log::warn!("write rare on invalid memory range {dst:#x}+{len}");
            return Err(WriteRareError::OutOfRange);
        };

        if !chunk.tags().is_rewritable() {
            log::warn!("write rare on non-rewritable chunk {:#x}", chunk.start());
            return Err(WriteRareError::NotRewritable);
        }

        Ok(chunk)
    }

    /// Whether `[addr, addr + len)` is a legitimate write-rare target.
    pub fn is_rewritable_range(&self, addr: usize, len: usize) -> bool {
        if len == 0 || !self.rewritable.load(Ordering::Acquire) {
            return false;
        }

        let Ok(state) = self.lock() else {
            return false;
        };

        find_chunk_containing(&state.chunks, addr, len)
            .is_some_and(|chunk| chunk.tags().is_rewritable())
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Unprotects and releases every chunk, then frees the pool.
    ///
    /// Pointers obtained from the pool dangle afterwards. Dropping the pool
    /// has the same effect.
    pub fn destroy(self) {
        drop(self);
    }

    fn release(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let count = state.chunks.len();

        for chunk in state.chunks.drain(..) {
            self.tracker.unregister(chunk.start());

            if chunk.tags().is_protected() {
                if let Err(e) = self.pages.set_writable(chunk.region()) {
                    log::warn!("could not unprotect chunk {:#x}: {e}", chunk.start());
                }
            }

            chunk.tags().disown();

            match Arc::try_unwrap(chunk) {
                Ok(chunk) => self.pages.free_region(chunk.into_region()),
                Err(_) => fatal(FatalError::ChunkStillReferenced),
            }
        }

        state.offset = 0;
        state.open = false;

        if count > 0 {
            log::debug!("pool destroyed, released {count} chunks");
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("rewritable", &self.rewritable.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
