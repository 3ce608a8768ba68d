// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::error::CopyViolation;
use crate::mode::PoolMode;
use crate::usercopy::{CopyDirection, check_copy};

use super::static_region::installed_region;
use super::utils::test_pool_with_mode;

#[test]
fn test_copy_out_of_valid_object() {
    let t = test_pool_with_mode(PoolMode::ReadOnly);
    let a = t.pool.zalloc(64).expect("Failed to zalloc(..)").as_ptr() as usize;
    t.pool.protect().expect("Failed to protect()");

    assert_eq!(check_copy(&t.tracker, a, 64, CopyDirection::ToUser), Ok(()));
}

#[test]
fn test_copy_into_pool_is_refused() {
    let t = test_pool_with_mode(PoolMode::WriteRare);
    let a = t.pool.zalloc(64).expect("Failed to zalloc(..)").as_ptr() as usize;

    assert_eq!(
        check_copy(&t.tracker, a, 64, CopyDirection::FromUser),
        Err(CopyViolation::IntoPool { addr: a, len: 64 })
    );
}

#[test]
fn test_copy_with_invalid_range_is_refused() {
    let t = test_pool_with_mode(PoolMode::ReadOnly);
    t.pool.expand(1).expect("Failed to expand(..)");
    let a = t.pool.zalloc(64).expect("Failed to zalloc(..)").as_ptr() as usize;

    // `a` sits at the top of its chunk, a page from there leaves it.
    let len = t.pool.config().refill;

    for direction in [CopyDirection::ToUser, CopyDirection::FromUser] {
        assert_eq!(
            check_copy(&t.tracker, a, len, direction),
            Err(CopyViolation::OutOfRange { addr: a, len })
        );
    }
}

#[test]
fn test_copy_outside_allocator_memory_passes() {
    let t = test_pool_with_mode(PoolMode::ReadOnly);
    t.pool.zalloc(8).expect("Failed to zalloc(..)");

    let stack = [0u8; 32];
    let addr = stack.as_ptr() as usize;

    assert_eq!(check_copy(&t.tracker, addr, 32, CopyDirection::ToUser), Ok(()));
    assert_eq!(check_copy(&t.tracker, addr, 32, CopyDirection::FromUser), Ok(()));
}

#[test]
fn test_copy_into_static_region_is_refused() {
    let t = test_pool_with_mode(PoolMode::ReadOnly);
    let region = installed_region();
    let start = region.start();

    assert_eq!(
        check_copy(&t.tracker, start, 16, CopyDirection::FromUser),
        Err(CopyViolation::IntoStaticRegion { addr: start, len: 16 })
    );

    // Partially overlapping the region counts too.
    let before = start - 8;
    assert_eq!(
        check_copy(&t.tracker, before, 16, CopyDirection::FromUser),
        Err(CopyViolation::IntoStaticRegion { addr: before, len: 16 })
    );

    assert_eq!(check_copy(&t.tracker, start, 16, CopyDirection::ToUser), Ok(()));
}
