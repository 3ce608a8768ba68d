// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Shared helpers for the pool tests.

use std::sync::Arc;

use sealpool_pages::MemfdPages;

use crate::chunk::ChunkTracker;
use crate::mode::PoolMode;
use crate::pool::{Pool, PoolConfig};

/// A pool on its own page source and tracker, so tests can inject faults and
/// count chunks without seeing each other.
pub(crate) struct TestPool {
    pub pool: Pool,
    pub pages: Arc<MemfdPages>,
    pub tracker: Arc<ChunkTracker>,
}

pub(crate) fn test_pool(config: PoolConfig) -> TestPool {
    let pages = Arc::new(MemfdPages::new());
    let tracker = Arc::new(ChunkTracker::new());

    let pool = Pool::with_pages(config, pages.clone(), tracker.clone())
        .expect("Failed to Pool::with_pages(..)");

    TestPool {
        pool,
        pages,
        tracker,
    }
}

pub(crate) fn test_pool_with_mode(mode: PoolMode) -> TestPool {
    test_pool(PoolConfig::new(mode))
}

pub(crate) fn read_bytes(addr: *const u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| unsafe { core::ptr::read_volatile(addr.add(i)) })
        .collect()
}

/// Runs an ignored test as a subprocess and returns its exit status.
pub(crate) fn run_test_as_subprocess(test_name: &str) -> std::process::ExitStatus {
    let exe = std::env::current_exe().expect("Failed to current_exe()");

    std::process::Command::new(exe)
        .args([
            "--exact",
            test_name,
            "--ignored",
            "--test-threads=1",
            "--nocapture",
        ])
        .status()
        .expect("Failed to run subprocess")
}
