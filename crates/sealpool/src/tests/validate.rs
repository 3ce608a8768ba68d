// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

use crate::validate::in_range;

#[test]
fn test_in_range_accepts_exact_fit() {
    assert!(in_range(0x1000, 0x2000, 0x1000, 0x1000));
    assert!(in_range(0x1000, 0x2000, 0x1ffc, 4));
}

#[test]
fn test_in_range_rejects_overhang() {
    assert!(!in_range(0x1000, 0x2000, 0x1ffe, 4));
    assert!(!in_range(0x1000, 0x2000, 0xfff, 4));
    assert!(!in_range(0x1000, 0x2000, 0x2000, 1));
}

#[test]
fn test_in_range_rejects_empty() {
    assert!(!in_range(0x1000, 0x2000, 0x1800, 0));
}

#[test]
fn test_in_range_rejects_wrap() {
    assert!(!in_range(0, usize::MAX, usize::MAX - 1, 4));
    assert!(!in_range(0x1000, 0x2000, 0x1800, usize::MAX));
}
