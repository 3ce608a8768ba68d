// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Protectable memory pools with a write-rare update path.
//!
//! Data that is written once during setup and then only read, or changed
//! very rarely, is a favourite target of memory corruption. This crate keeps
//! such data in pages that are read-only for the rest of the process:
//!
//! - [`Pool`] is a bump allocator over page-aligned chunks. Allocations are
//!   made while the chunks are writable, then the pool is protected.
//! - Write-rare pools can still be updated, but only through
//!   [`Pool::write_rare`] and friends: the update goes through a temporary
//!   writable alias of a single page, with every signal blocked on the
//!   calling thread, and is verified afterwards.
//! - [`StaticRegion`] is the same idea for data placed once at startup.
//! - [`check_copy`] refuses copies that would write into protected memory or
//!   that do not fit a tracked object.
//!
//! Protection only ever tightens: writable, then write-rare, then read-only.
//! Memory is never returned to a pool; all of it goes back at once when the
//! pool is destroyed.
//!
//! # Example
//!
//! ```rust
//! use sealpool::{Pool, PoolMode, RareWrite};
//!
//! # #[cfg(target_os = "linux")]
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = Pool::with_mode(PoolMode::WriteRare)?;
//!
//!     let limits = pool.calloc(4, size_of::<u32>())?.cast::<u32>();
//!     pool.protect()?;
//!
//!     pool.write_u32(limits.as_ptr(), 64)?;
//!     assert_eq!(unsafe { limits.as_ptr().read_volatile() }, 64);
//!
//!     // No more updates, ever.
//!     pool.make_read_only()?;
//!     assert!(pool.write_u32(limits.as_ptr(), 0).is_err());
//!
//!     Ok(())
//! }
//! # #[cfg(target_os = "linux")]
//! # example().unwrap();
//! ```
//!
//! # Logging
//!
//! Diagnostics go through the [`log`] facade. Policy violations are logged
//! at `warn`, fatal conditions at `error` right before the process aborts.
//! No logger is installed by this crate.

#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
mod tests;

mod chunk;
mod engine;
mod error;
mod fatal;
mod mode;
mod pool;
mod rare_write;
mod static_region;
mod tags;

pub mod usercopy;
pub mod validate;

pub use chunk::{Chunk, ChunkTracker, ObjectStatus, Span};
pub use error::{CopyViolation, PoolError, WriteRareError};
pub use mode::PoolMode;
pub use pool::{DEFAULT_ALIGN, DEFAULT_REFILL, Pool, PoolConfig};
pub use rare_write::RareWrite;
pub use static_region::StaticRegion;
pub use tags::{ChunkTags, Protection};
pub use usercopy::{CopyDirection, check_copy};
pub use validate::{in_range, in_rewritable_chunk, in_static_region};

#[cfg(target_os = "linux")]
use std::sync::{Arc, LazyLock};

#[cfg(target_os = "linux")]
static DEFAULT_PAGES: LazyLock<Arc<sealpool_pages::MemfdPages>> =
    LazyLock::new(|| Arc::new(sealpool_pages::MemfdPages::new()));

/// The page source shared by pools and regions that are not given one.
#[cfg(target_os = "linux")]
pub(crate) fn default_pages() -> Arc<dyn sealpool_pages::Pages> {
    DEFAULT_PAGES.clone()
}
