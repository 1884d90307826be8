//! RAII guards for per-thread signal bookkeeping
//!
//! Signal delivery and `sigreturn` both adjust a thread's nesting counter
//! before they know whether the rest of the operation will succeed. The
//! guards here make the adjustment provisional: dropping a guard undoes it,
//! [`SignalDepthGuard::commit`] / [`SignalReturnGuard::commit`] keep it.

use core::sync::atomic::{AtomicU32, Ordering};

/// Provisional increment of a signal nesting counter
pub struct SignalDepthGuard<'a> {
    depth: &'a AtomicU32,
}

impl<'a> SignalDepthGuard<'a> {
    /// Increment `depth`. Fails with the current depth, leaving the counter
    /// unchanged, if `max` frames are already live.
    pub fn enter(depth: &'a AtomicU32, max: u32) -> Result<Self, u32> {
        let previous = depth.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            depth.fetch_sub(1, Ordering::AcqRel);
            return Err(previous);
        }
        Ok(Self { depth })
    }

    /// Depth including this guard's frame.
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Acquire)
    }

    /// Keep the increment.
    pub fn commit(self) {
        core::mem::forget(self);
    }
}

impl Drop for SignalDepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::AcqRel);
        log::trace!("[RAII] Rolled back signal depth to {}", self.depth());
    }
}

/// Provisional decrement of a signal nesting counter
pub struct SignalReturnGuard<'a> {
    depth: &'a AtomicU32,
}

impl<'a> SignalReturnGuard<'a> {
    /// Decrement `depth`. Fails without touching the counter when it is
    /// already zero.
    pub fn enter(depth: &'a AtomicU32) -> Option<Self> {
        depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1))
            .ok()
            .map(|_| Self { depth })
    }

    /// Keep the decrement.
    pub fn commit(self) {
        core::mem::forget(self);
    }
}

impl Drop for SignalReturnGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
        log::trace!(
            "[RAII] Restored signal depth to {}",
            self.depth.load(Ordering::Acquire)
        );
    }
}
