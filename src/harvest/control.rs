//! Run control shared between the harvester and its caller
//!
//! The caller keeps an `Arc<HarvestControl>` to observe whether a harvest is
//! active and to request a graceful stop. Every pause the harvester takes goes
//! through [`HarvestControl::pause`], so a stop request also cuts a cooldown
//! short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Running flag and stop signal for one harvester
#[derive(Debug, Default)]
pub struct HarvestControl {
    running: AtomicBool,
    stop_requested: AtomicBool,
    wake: Notify,
}

impl HarvestControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a harvest is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Requests that the active harvest suspend at the next opportunity
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Marks a harvest as active
    ///
    /// Returns `None` if one is already running. The returned guard clears the
    /// running flag when dropped.
    pub(crate) fn begin(&self) -> Option<RunningGuard<'_>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        Some(RunningGuard { control: self })
    }

    /// Sleeps for `duration` unless a stop is requested first
    ///
    /// Returns true if the full duration elapsed.
    pub async fn pause(&self, duration: Duration) -> bool {
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.stop_requested() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.stop_requested(),
            _ = notified => false,
        }
    }
}

/// Clears the running flag on drop
#[derive(Debug)]
pub(crate) struct RunningGuard<'a> {
    control: &'a HarvestControl,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.control.running.store(false, Ordering::SeqCst);
    }
}
