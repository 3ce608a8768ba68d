// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! Copy hardening.
//!
//! Code that moves bytes between untrusted buffers and process memory asks
//! [`check_copy`] first. Pool memory and the static region may be read
//! from, object by object, but never written by such a copy.

use crate::chunk::{ChunkTracker, ObjectStatus, Span, span_of};
use crate::error::CopyViolation;
use crate::static_region::StaticRegion;

/// Which way the bytes flow, seen from the untrusted side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Out of process memory at `addr`.
    ToUser,
    /// Into process memory at `addr`.
    FromUser,
}

/// Decides whether a copy touching `[addr, addr + len)` may proceed.
pub fn check_copy(
    tracker: &ChunkTracker,
    addr: usize,
    len: usize,
    direction: CopyDirection,
) -> Result<(), CopyViolation> {
    if direction == CopyDirection::FromUser && touches_static_region(addr, len) {
        log::error!("refusing copy into static region at {addr:#x}+{len}");
        return Err(CopyViolation::IntoStaticRegion { addr, len });
    }

    match tracker.check_object(addr, len) {
        ObjectStatus::NotOurs => Ok(()),
        ObjectStatus::OutOfRange => {
            log::error!("refusing copy of invalid pool range {addr:#x}+{len}");
            Err(CopyViolation::OutOfRange { addr, len })
        }
        ObjectStatus::Valid => match direction {
            CopyDirection::ToUser => Ok(()),
            CopyDirection::FromUser => {
                log::error!("refusing copy into pool memory at {addr:#x}+{len}");
                Err(CopyViolation::IntoPool { addr, len })
            }
        },
    }
}

fn touches_static_region(addr: usize, len: usize) -> bool {
    StaticRegion::global()
        .is_some_and(|region| span_of(region.start(), region.end(), addr, len) != Span::Outside)
}
