//! In-flight run accounting.
//!
//! The orchestrator holds a [`RunGuard`] for the duration of each run; the
//! shutdown manager waits on the tracker to reach zero before the process
//! exits.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Notify;

/// Counts in-flight runs and wakes drain waiters on completion.
#[derive(Default)]
pub struct RunTracker {
    in_flight: AtomicUsize,
    notify: Notify,
}

impl RunTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a run; the returned guard deregisters on drop.
    pub fn track(self: Arc<Self>) -> RunGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        RunGuard { tracker: self }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no runs are in flight.  Returns immediately when idle.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before re-checking to avoid a lost wakeup.
            let notified = self.notify.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the in-flight count on drop.
pub struct RunGuard {
    tracker: Arc<RunTracker>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.tracker.notify.notify_waiters();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
