// Copyright (c) 2025-2026 Federico Hoerth <memparanoid@gmail.com>
// SPDX-License-Identifier: GPL-3.0-only
// See LICENSE in the repository root for full license text.

//! SignalGuard - keeps asynchronous handlers off the current thread.

use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr;

use crate::error::PageError;

/// RAII guard that blocks every maskable signal on creation and restores
/// the previous signal mask on drop.
///
/// While the guard is alive no signal handler can run on this thread, so
/// nothing unrelated can observe or reuse a writable alias mapped inside the
/// guarded section. `SIGKILL`, `SIGSTOP` and synchronous faults are not
/// maskable and still terminate the thread as usual.
///
/// The mask is per thread, so the guard is neither `Send` nor `Sync`.
///
/// # Example
///
/// ```
/// use sealpool_pages::SignalGuard;
///
/// {
///     let _guard = SignalGuard::block_all().expect("Failed to block_all()");
///     // critical section, no signal handlers run here
/// }
/// // previous mask restored here
/// ```
pub struct SignalGuard {
    previous: libc::sigset_t,
    _not_send: PhantomData<*const ()>,
}

impl SignalGuard {
    /// Blocks all maskable signals and remembers the mask in effect before.
    pub fn block_all() -> Result<Self, PageError> {
        let mut all = MaybeUninit::<libc::sigset_t>::uninit();
        let mut previous = MaybeUninit::<libc::sigset_t>::uninit();

        let failed = unsafe {
            libc::sigfillset(all.as_mut_ptr()) != 0
                || libc::pthread_sigmask(libc::SIG_BLOCK, all.as_ptr(), previous.as_mut_ptr())
                    != 0
        };

        if failed {
            return Err(PageError::SignalMask);
        }

        Ok(Self {
            previous: unsafe { previous.assume_init() },
            _not_send: PhantomData,
        })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, ptr::null_mut());
        }
    }
}

impl core::fmt::Debug for SignalGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalGuard").finish_non_exhaustive()
    }
}
