//! Per-session write queue accounting.
//!
//! Fan-out never waits on a slow peer: [`BackpressureController::try_reserve`]
//! fails immediately once a session has `max_pending` frames queued. Direct
//! replies use [`BackpressureController::reserve`], which parks until the
//! writer task releases a slot or the timeout passes.
//!
//! Defaults: 1024 pending frames, 5s timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{FramecastError, Result};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default backpressure timeout (how long `reserve` waits for a slot).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Shared {
    pending: AtomicUsize,
    released: Notify,
}

/// Pending-frame counter shared between a session and its writer task.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    shared: Arc<Shared>,
    max_pending: usize,
    timeout: Duration,
}

impl BackpressureController {
    /// Create a controller with the default timeout.
    pub fn new(max_pending: usize) -> Self {
        Self::with_timeout(max_pending, DEFAULT_TIMEOUT)
    }

    /// Create a controller with a custom timeout.
    pub fn with_timeout(max_pending: usize, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            max_pending: max_pending.max(1),
            timeout,
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending_count() >= self.max_pending
    }

    /// Current pending count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Reserve a slot without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` if at capacity.
    pub fn try_reserve(&self) -> Result<()> {
        self.shared
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_pending).then_some(current + 1)
            })
            .map(|_| ())
            .map_err(|_| FramecastError::BackpressureTimeout)
    }

    /// Reserve a slot, waiting up to the configured timeout.
    pub async fn reserve(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            // Register interest before checking so a release in between is not lost.
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.try_reserve().is_ok() {
                return Ok(());
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                return self.try_reserve();
            }
        }
    }

    /// Release one slot (a frame was written or dropped).
    #[inline]
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Release several slots at once (after a batch write).
    pub fn release_many(&self, count: usize) {
        if count == 0 {
            return;
        }
        let _ = self
            .shared
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
        self.shared.released.notify_waiters();
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

/// Releases one reserved slot on drop unless disarmed.
///
/// Held between reserving a slot and handing the frame to the channel, so an
/// early return cannot leak the slot.
pub struct BackpressureGuard {
    controller: BackpressureController,
    armed: bool,
}

impl BackpressureGuard {
    /// Create a guard for a slot that has already been reserved.
    pub fn new(controller: BackpressureController) -> Self {
        Self {
            controller,
            armed: true,
        }
    }

    /// Keep the slot reserved; the writer task releases it.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BackpressureGuard {
    fn drop(&mut self) {
        if self.armed {
            self.controller.release();
        }
    }
}
