// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Write-rare update engine.
//!
//! Mutates memory whose primary mapping is read-only, one page at a time:
//!
//! 1. block signals on the thread ([`SignalGuard`])
//! 2. map a writable alias of the page ([`WriteAlias::map_writable`])
//! 3. copy or fill the bytes at the destination's offset within the page
//! 4. unmap the alias, restore the signal mask
//!
//! Once every page is written the destination is read back through its
//! primary mapping. A mismatch means the memory is not what the caller
//! believed it to be, and the process aborts.
//!
//! Counters get the same treatment: [`add_counter`] performs one atomic
//! read-modify-write through the alias instead of a byte copy.
//!
//! Callers validate the destination first. The engine only re-checks that
//! the range lies inside the region it was handed.

use core::mem::{align_of, size_of};
use core::ptr;
use core::sync::atomic::{AtomicIsize, Ordering};

use sealpool_pages::{Region, SignalGuard, WriteAlias, page_size};

use crate::error::{FatalError, WriteRareError};
use crate::fatal::fatal;
use crate::validate::in_range;

/// What to write.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteOp<'a> {
    /// Copy these bytes.
    Copy(&'a [u8]),
    /// Repeat this byte.
    Fill(u8),
}

impl WriteOp<'_> {
    /// Rejects a source that shares bytes with `[dst, dst + len)`.
    pub(crate) fn check_overlap(&self, dst: usize, len: usize) -> Result<(), WriteRareError> {
        let WriteOp::Copy(src) = self else {
            return Ok(());
        };

        let src_start = src.as_ptr() as usize;
        let src_end = src_start + src.len();
        let dst_end = dst.saturating_add(len);

        if src_start < dst_end && dst < src_end {
            log::warn!("write rare source {src_start:#x} overlaps destination {dst:#x}");
            return Err(WriteRareError::Overlap);
        }

        Ok(())
    }

    fn expected(&self, index: usize) -> u8 {
        match self {
            WriteOp::Copy(src) => src[index],
            WriteOp::Fill(byte) => *byte,
        }
    }
}

/// Writes `len` bytes at `dst`, which must lie inside `region`.
///
/// On an alias failure the pages already written keep their new content and
/// the remaining pages are untouched.
pub(crate) fn write_pages<A: WriteAlias + ?Sized>(
    alias: &A,
    region: &Region,
    dst: usize,
    len: usize,
    op: WriteOp<'_>,
) -> Result<(), WriteRareError> {
    if let WriteOp::Copy(src) = op {
        debug_assert_eq!(src.len(), len);
    }

    if !in_range(region.start(), region.end(), dst, len) {
        fatal(FatalError::ChunkMismatch);
    }

    let page = page_size();
    let mut done = 0;

    while done < len {
        let addr = dst + done;
        let offset = addr % page;
        let size = (len - done).min(page - offset);
        let index = (addr - region.start()) / page;

        write_one_page(alias, region, index, offset, done, size, op)?;

        done += size;
    }

    verify(dst, len, op);

    Ok(())
}

#[inline(always)]
fn write_one_page<A: WriteAlias + ?Sized>(
    alias: &A,
    region: &Region,
    index: usize,
    offset: usize,
    done: usize,
    size: usize,
    op: WriteOp<'_>,
) -> Result<(), WriteRareError> {
    let signals = SignalGuard::block_all().map_err(WriteRareError::SignalMask)?;

    let target = alias.map_writable(region, index).map_err(|e| {
        log::error!(
            "failed to remap page {index} of {:#x} for write rare: {e}",
            region.start()
        );
        WriteRareError::Alias(e)
    })?;

    unsafe {
        let base = target.as_ptr().add(offset);

        match op {
            WriteOp::Copy(src) => ptr::copy_nonoverlapping(src.as_ptr().add(done), base, size),
            WriteOp::Fill(byte) => ptr::write_bytes(base, byte, size),
        }
    }

    alias.unmap(target);
    drop(signals);

    log::trace!("write rare: {size} bytes at page {index} offset {offset}");

    Ok(())
}

/// Atomically adds `delta` to the counter at `dst`, which must lie inside
/// `region`, and returns the new value.
///
/// The addition wraps on overflow.
pub(crate) fn add_counter<A: WriteAlias + ?Sized>(
    alias: &A,
    region: &Region,
    dst: usize,
    delta: isize,
) -> Result<isize, WriteRareError> {
    if dst % align_of::<AtomicIsize>() != 0 {
        log::warn!("write rare counter at {dst:#x} is misaligned");
        return Err(WriteRareError::Misaligned);
    }

    if !in_range(region.start(), region.end(), dst, size_of::<AtomicIsize>()) {
        fatal(FatalError::ChunkMismatch);
    }

    let page = page_size();
    let offset = dst % page;
    let index = (dst - region.start()) / page;

    let signals = SignalGuard::block_all().map_err(WriteRareError::SignalMask)?;

    let target = alias.map_writable(region, index).map_err(|e| {
        log::error!(
            "failed to remap page {index} of {:#x} for counter update: {e}",
            region.start()
        );
        WriteRareError::Alias(e)
    })?;

    let previous = unsafe {
        let counter = &*target.as_ptr().add(offset).cast::<AtomicIsize>();
        counter.fetch_add(delta, Ordering::SeqCst)
    };

    alias.unmap(target);
    drop(signals);

    let value = previous.wrapping_add(delta);

    log::trace!("write rare: counter at {dst:#x} now {value}");

    let seen = unsafe { (*(dst as *const AtomicIsize)).load(Ordering::SeqCst) };

    if seen != value {
        fatal(FatalError::VerificationMismatch);
    }

    Ok(value)
}

fn verify(dst: usize, len: usize, op: WriteOp<'_>) {
    let base = dst as *const u8;

    let matches = (0..len).all(|i| unsafe { ptr::read_volatile(base.add(i)) } == op.expected(i));

    if !matches {
        fatal(FatalError::VerificationMismatch);
    }
}
