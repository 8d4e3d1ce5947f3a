//! Single in-flight capture guard
//!
//! Full-page, viewport and element captures all share one [`CaptureLock`].
//! Acquiring it yields a [`CaptureLease`]; the lock is released when the
//! lease is dropped, whichever way the capture ends.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "capture in progress" flag. Clones refer to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CaptureLock {
    busy: Arc<AtomicBool>,
}

/// Proof that the holder owns the lock; releases it on drop.
#[derive(Debug)]
pub struct CaptureLease {
    busy: Arc<AtomicBool>,
}

impl CaptureLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, failing immediately if another capture holds it.
    pub fn try_acquire(&self) -> Result<CaptureLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::CaptureInProgress)?;
        Ok(CaptureLease {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Whether `lease` was handed out by this lock (or one of its clones).
    pub fn issued(&self, lease: &CaptureLease) -> bool {
        Arc::ptr_eq(&self.busy, &lease.busy)
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
