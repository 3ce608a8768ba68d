// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Conditions that must take the process down.
//!
//! Each case runs in a child process; the driver checks how it died.

use core::ptr::{self, NonNull};
use core::sync::atomic::AtomicIsize;
use std::os::unix::process::ExitStatusExt;
use std::sync::Arc;

use serial_test::serial;

use sealpool_pages::{
    AliasPage, MemfdPages, PageError, PageSource, PagesBehaviour, Region, WriteAlias, page_size,
};

use crate::chunk::ChunkTracker;
use crate::engine::{WriteOp, write_pages};
use crate::error::FatalError;
use crate::mode::PoolMode;
use crate::pool::{Pool, PoolConfig};
use crate::static_region::StaticRegion;

use super::utils::{run_test_as_subprocess, test_pool_with_mode};

/// Page source whose aliases point at unrelated anonymous memory, so writes
/// never reach the destination.
#[derive(Debug, Default)]
struct DetachedAlias {
    inner: MemfdPages,
}

impl PageSource for DetachedAlias {
    fn alloc_region(&self, size: usize) -> Result<Region, PageError> {
        self.inner.alloc_region(size)
    }

    fn free_region(&self, region: Region) {
        self.inner.free_region(region)
    }

    fn set_readonly(&self, region: &Region) -> Result<(), PageError> {
        self.inner.set_readonly(region)
    }

    fn set_writable(&self, region: &Region) -> Result<(), PageError> {
        self.inner.set_writable(region)
    }

    fn owns(&self, addr: usize) -> bool {
        self.inner.owns(addr)
    }
}

impl WriteAlias for DetachedAlias {
    fn map_writable(&self, _region: &Region, _index: usize) -> Result<AliasPage, PageError> {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                page_size(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(PageError::Alias);
        }

        let addr = NonNull::new(addr.cast::<u8>()).ok_or(PageError::Alias)?;

        Ok(unsafe { AliasPage::from_raw_parts(addr, page_size()) })
    }

    fn unmap(&self, alias: AliasPage) {
        unsafe { libc::munmap(alias.as_ptr().cast(), alias.len()) };
    }
}

fn assert_exit_code(test_name: &str, error: FatalError) {
    let status = run_test_as_subprocess(test_name);

    assert_eq!(
        status.code(),
        Some(error as i32),
        "Subprocess should exit with {error:?}"
    );
}

fn assert_segfault(test_name: &str) {
    let status = run_test_as_subprocess(test_name);

    assert_eq!(status.code(), None, "Subprocess should be killed by a signal");
    assert!(matches!(
        status.signal(),
        Some(libc::SIGSEGV) | Some(libc::SIGBUS)
    ));
}

// =============================================================================
// Verification mismatch
// =============================================================================

#[test]
#[ignore]
fn subprocess_test_verification_mismatch_aborts() {
    let pool = Pool::with_pages(
        PoolConfig::new(PoolMode::WriteRare),
        Arc::new(DetachedAlias::default()),
        Arc::new(ChunkTracker::new()),
    )
    .expect("Failed to Pool::with_pages(..)");

    let a = pool.zalloc(8).expect("Failed to zalloc(..)");
    pool.protect().expect("Failed to protect()");

    let _ = pool.write_rare(a.as_ptr(), &[1; 8]);

    // Unreachable when verification works.
    std::process::exit(0);
}

#[test]
#[serial(subprocess)]
fn test_verification_mismatch_aborts() {
    assert_exit_code(
        "tests::fatal::subprocess_test_verification_mismatch_aborts",
        FatalError::VerificationMismatch,
    );
}

#[test]
#[ignore]
fn subprocess_test_counter_verification_mismatch_aborts() {
    let pool = Pool::with_pages(
        PoolConfig::new(PoolMode::WriteRare),
        Arc::new(DetachedAlias::default()),
        Arc::new(ChunkTracker::new()),
    )
    .expect("Failed to Pool::with_pages(..)");

    let counter = pool
        .zalloc(size_of::<AtomicIsize>())
        .expect("Failed to zalloc(..)")
        .cast::<AtomicIsize>();
    pool.protect().expect("Failed to protect()");

    let _ = pool.add_rare(counter.as_ptr(), 1);

    std::process::exit(0);
}

#[test]
#[serial(subprocess)]
fn test_counter_verification_mismatch_aborts() {
    assert_exit_code(
        "tests::fatal::subprocess_test_counter_verification_mismatch_aborts",
        FatalError::VerificationMismatch,
    );
}

// =============================================================================
// Chunk mismatch
// =============================================================================

#[test]
#[ignore]
fn subprocess_test_engine_refuses_range_outside_region() {
    let pages = MemfdPages::new();
    let region = pages.alloc_region(1).expect("Failed to alloc_region(..)");

    let _ = write_pages(&pages, &region, region.end() - 2, 4, WriteOp::Fill(1));

    std::process::exit(0);
}

#[test]
#[serial(subprocess)]
fn test_engine_refuses_range_outside_region() {
    assert_exit_code(
        "tests::fatal::subprocess_test_engine_refuses_range_outside_region",
        FatalError::ChunkMismatch,
    );
}

// =============================================================================
// Protection failure
// =============================================================================

#[test]
#[ignore]
fn subprocess_test_protect_failure_aborts() {
    let t = test_pool_with_mode(PoolMode::ReadOnly);
    t.pool.allocate(8).expect("Failed to allocate(..)");

    t.pages.change_behaviour(PagesBehaviour::FailAtProtect);
    let _ = t.pool.protect();

    std::process::exit(0);
}

#[test]
#[serial(subprocess)]
fn test_protect_failure_aborts() {
    assert_exit_code(
        "tests::fatal::subprocess_test_protect_failure_aborts",
        FatalError::ProtectFailed,
    );
}

// =============================================================================
// Direct writes to protected memory
// =============================================================================

#[test]
#[ignore]
fn subprocess_test_direct_write_to_protected_pool_faults() {
    let t = test_pool_with_mode(PoolMode::WriteRare);
    let a = t.pool.zalloc(8).expect("Failed to zalloc(..)");
    t.pool.protect().expect("Failed to protect()");

    unsafe { a.as_ptr().write_volatile(1) };

    std::process::exit(0);
}

#[test]
#[serial(subprocess)]
fn test_direct_write_to_protected_pool_faults() {
    assert_segfault("tests::fatal::subprocess_test_direct_write_to_protected_pool_faults");
}

#[test]
#[ignore]
fn subprocess_test_direct_write_to_sealed_region_faults() {
    let region = StaticRegion::with_pages(Arc::new(MemfdPages::new()), 1)
        .expect("Failed to StaticRegion::with_pages(..)");
    let value = region.place_value(7u64).expect("Failed to place_value(..)");
    region.seal();

    unsafe { value.as_ptr().write_volatile(8) };

    std::process::exit(0);
}

#[test]
#[serial(subprocess)]
fn test_direct_write_to_sealed_region_faults() {
    assert_segfault("tests::fatal::subprocess_test_direct_write_to_sealed_region_faults");
}
