// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Page regions with memory protection and single-page writable aliases.
//!
//! This crate is the memory-manager side of `sealpool`: it hands out
//! page-aligned regions, toggles them between read-only and read-write, and
//! provides the one privileged operation the write-rare path needs, a
//! short-lived writable alias of a single page whose primary mapping is
//! read-only.
//!
//! # Traits
//!
//! - [`PageSource`]: `alloc_region` / `free_region` / `set_readonly` /
//!   `set_writable` / `owns`
//! - [`WriteAlias`]: `map_writable` / `unmap`, the remap capability
//! - [`Pages`]: both of the above, blanket-implemented
//!
//! # MemfdPages (Linux only)
//!
//! - One `memfd_create` file per source; each region maps its own file range
//!   `MAP_SHARED`, and freed ranges are reused
//! - `mprotect` for read-only / read-write
//! - Aliases map the same file page again at a different address
//!
//! # SignalGuard
//!
//! Blocks every maskable signal on the current thread for the lifetime of
//! the guard. The write-rare path holds one around every alias.
//!
//! # Example
//!
//! ```rust
//! #[cfg(target_os = "linux")]
//! fn example() -> Result<(), sealpool_pages::PageError> {
//!     use sealpool_pages::{MemfdPages, PageSource, SignalGuard, WriteAlias};
//!
//!     let pages = MemfdPages::new();
//!     let region = pages.alloc_region(1)?;
//!     pages.set_readonly(&region)?;
//!
//!     {
//!         let _guard = SignalGuard::block_all()?;
//!         let alias = pages.map_writable(&region, 0)?;
//!         unsafe { alias.as_ptr().write(42) };
//!         pages.unmap(alias);
//!     }
//!
//!     assert_eq!(unsafe { region.addr().as_ptr().read() }, 42);
//!
//!     pages.free_region(region);
//!     Ok(())
//! }
//! # #[cfg(target_os = "linux")]
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
mod tests;

#[cfg(any(test, feature = "test-utils"))]
mod behaviour;
mod error;
mod page_size;
mod region;
mod traits;

#[cfg(target_os = "linux")]
mod memfd;

#[cfg(unix)]
mod signal;

#[cfg(any(test, feature = "test-utils"))]
pub use behaviour::PagesBehaviour;
pub use error::PageError;
pub use page_size::{page_size, round_up_to_page};
pub use region::{AliasPage, Region};
pub use traits::{PageSource, Pages, WriteAlias};

#[cfg(target_os = "linux")]
pub use memfd::MemfdPages;

#[cfg(unix)]
pub use signal::SignalGuard;
