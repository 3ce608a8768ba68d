// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Typed write-rare helpers.

use core::mem::size_of;
use core::slice;
use core::sync::atomic::{AtomicIsize, Ordering, fence};

use crate::error::WriteRareError;
use crate::pool::Pool;
use crate::static_region::StaticRegion;

macro_rules! scalar_writers {
    ($($(#[$doc:meta])* $name:ident: $ty:ty;)*) => {
        $(
            $(#[$doc])*
            #[inline]
            fn $name(&self, dst: *const $ty, value: $ty) -> Result<(), WriteRareError> {
                self.write_rare(dst.cast::<u8>(), &value.to_ne_bytes())
            }
        )*
    };
}

/// Memory that can be updated through the write-rare path.
///
/// Every scalar writer is a full write-rare operation: validated, performed
/// through a temporary alias and verified.
pub trait RareWrite {
    /// Copies `src` to `dst`.
    fn write_rare(&self, dst: *const u8, src: &[u8]) -> Result<(), WriteRareError>;

    /// Sets `len` bytes at `dst` to `byte`.
    fn fill_rare(&self, dst: *const u8, byte: u8, len: usize) -> Result<(), WriteRareError>;

    /// Atomically adds `delta` to the counter at `dst` and returns the new
    /// value. Wraps on overflow.
    fn add_rare(&self, dst: *const AtomicIsize, delta: isize) -> Result<isize, WriteRareError>;

    /// Atomically increments the counter at `dst` and returns the new value.
    #[inline]
    fn inc_rare(&self, dst: *const AtomicIsize) -> Result<isize, WriteRareError> {
        self.add_rare(dst, 1)
    }

    /// Atomically decrements the counter at `dst` and returns the new value.
    #[inline]
    fn dec_rare(&self, dst: *const AtomicIsize) -> Result<isize, WriteRareError> {
        self.add_rare(dst, -1)
    }

    scalar_writers! {
        /// Writes one `u8`.
        write_u8: u8;
        /// Writes one `u16`.
        write_u16: u16;
        /// Writes one `u32`.
        write_u32: u32;
        /// Writes one `u64`.
        write_u64: u64;
        /// Writes one `i8`.
        write_i8: i8;
        /// Writes one `i16`.
        write_i16: i16;
        /// Writes one `i32`.
        write_i32: i32;
        /// Writes one `i64`.
        write_i64: i64;
        /// Writes one `usize`.
        write_usize: usize;
        /// Writes one `isize`.
        write_isize: isize;
    }

    /// Writes one `bool`.
    #[inline]
    fn write_bool(&self, dst: *const bool, value: bool) -> Result<(), WriteRareError> {
        self.write_rare(dst.cast::<u8>(), &[u8::from(value)])
    }

    /// Copies the whole of `value` over the `T` at `dst`.
    ///
    /// Every byte of `T` is copied and read back, so `T` should not contain
    /// padding.
    fn write_value<T: Copy>(&self, dst: *const T, value: &T) -> Result<(), WriteRareError>
    where
        Self: Sized,
    {
        let bytes =
            unsafe { slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>()) };

        self.write_rare(dst.cast::<u8>(), bytes)
    }

    /// Publishes a pointer.
    ///
    /// Writes made before the call are visible to whoever reads the new
    /// pointer.
    fn write_ptr<T>(&self, dst: *const *const T, value: *const T) -> Result<(), WriteRareError>
    where
        Self: Sized,
    {
        fence(Ordering::Release);
        self.write_usize(dst.cast::<usize>(), value as usize)
    }
}

impl RareWrite for Pool {
    fn write_rare(&self, dst: *const u8, src: &[u8]) -> Result<(), WriteRareError> {
        Pool::write_rare(self, dst, src)
    }

    fn fill_rare(&self, dst: *const u8, byte: u8, len: usize) -> Result<(), WriteRareError> {
        Pool::fill_rare(self, dst, byte, len)
    }

    fn add_rare(&self, dst: *const AtomicIsize, delta: isize) -> Result<isize, WriteRareError> {
        Pool::add_rare(self, dst, delta)
    }
}

impl RareWrite for StaticRegion {
    fn write_rare(&self, dst: *const u8, src: &[u8]) -> Result<(), WriteRareError> {
        StaticRegion::write_rare(self, dst, src)
    }

    fn fill_rare(&self, dst: *const u8, byte: u8, len: usize) -> Result<(), WriteRareError> {
        StaticRegion::fill_rare(self, dst, byte, len)
    }

    fn add_rare(&self, dst: *const AtomicIsize, delta: isize) -> Result<isize, WriteRareError> {
        StaticRegion::add_rare(self, dst, delta)
    }
}
