//! Busy-wait exclusion over the register block.
//!
//! `HwLock` hands out the single token that permits a register-level
//! transaction. Acquisition blocks all signals for the calling thread
//! first, so no re-entrant handler can start a nested transaction, then
//! spins on the token. Release and mask restoration are RAII, so they
//! happen on every exit path including early error returns and panics.
//!
//! The held span must stay minimal: hardware-ready polling belongs inside
//! it, logging and caller-buffer copies do not.

use crate::bus::RegisterBus;
use crate::error::UartResult;
use crate::regs::RegisterBlock;
use nix::sys::signal::{SigSet, SigmaskHow, pthread_sigmask};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The exclusion token plus acquisition counters.
#[derive(Debug, Default)]
pub struct HwLock {
    /// Token: true while a transaction holds the critical section
    locked: AtomicBool,
    /// Total successful acquisitions
    acquisitions: AtomicU64,
    /// Acquisitions that found the token taken on first try
    contentions: AtomicU64,
}

/// Restores the thread's previous signal mask on drop.
struct MaskGuard {
    previous: SigSet,
}

impl MaskGuard {
    fn block_all() -> UartResult<Self> {
        let mut previous = SigSet::empty();
        pthread_sigmask(
            SigmaskHow::SIG_SETMASK,
            Some(&SigSet::all()),
            Some(&mut previous),
        )?;
        Ok(Self { previous })
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        // Restoring a mask we previously held cannot fail meaningfully.
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// Releases the token on drop.
struct TokenGuard<'a> {
    lock: &'a HwLock,
}

impl Drop for TokenGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl HwLock {
    /// Create the token in the unlocked state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one register-level transaction under exclusive access.
    ///
    /// Blocks all signals for the calling thread, spin-acquires the token,
    /// runs `body` with a typed view of the register block, then releases
    /// the token and restores the signal mask, in that order, whatever
    /// path `body` takes out.
    pub fn with_exclusive<T>(
        &self,
        bus: &dyn RegisterBus,
        body: impl FnOnce(&RegisterBlock<'_>) -> UartResult<T>,
    ) -> UartResult<T> {
        let _mask = MaskGuard::block_all()?;
        let _token = self.acquire();
        let regs = RegisterBlock::new(bus);
        body(&regs)
    }

    /// Spin until the token is ours.
    fn acquire(&self) -> TokenGuard<'_> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.contentions.fetch_add(1, Ordering::Relaxed);
            while self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                core::hint::spin_loop();
            }
        }
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        TokenGuard { lock: self }
    }

    /// `(acquisitions, contentions)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.acquisitions.load(Ordering::Relaxed),
            self.contentions.load(Ordering::Relaxed),
        )
    }
}
