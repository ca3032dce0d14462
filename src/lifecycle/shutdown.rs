//! Graceful shutdown: stop intake, drain in-flight runs, then cancel.

use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::event_bus::{AppEvent, EventBus};

use super::tracker::RunTracker;

/// Default time allowed for in-flight runs to finish.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates shutdown: flips the stop signal subsystems watch, then waits
/// up to the drain timeout for the run tracker to reach zero.
pub struct ShutdownManager {
    tracker: Arc<RunTracker>,
    drain_timeout: Duration,
    stop_tx: watch::Sender<bool>,
    bus: Option<Arc<dyn EventBus>>,
}

impl ShutdownManager {
    pub fn new(tracker: Arc<RunTracker>, drain_timeout: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            tracker,
            drain_timeout,
            stop_tx,
            bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Stop-signal receiver for subsystems (scheduler, retention).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Begin shutdown: signal subsystems to stop accepting work, then wait
    /// for in-flight runs.  Returns `true` when the drain completed inside
    /// the timeout; `false` means remaining run contexts must be cancelled.
    pub async fn drain(&self) -> bool {
        tracing::info!(
            in_flight = self.tracker.in_flight(),
            timeout_secs = self.drain_timeout.as_secs(),
            "shutdown: draining in-flight runs"
        );
        if let Some(bus) = &self.bus {
            let _ = bus.publish(AppEvent::ShutdownStarted);
        }
        let _ = self.stop_tx.send(true);

        let drained = tokio::time::timeout(self.drain_timeout, self.tracker.wait_idle())
            .await
            .is_ok();
        if drained {
            tracing::info!("shutdown: drain complete");
        } else {
            tracing::warn!(
                remaining = self.tracker.in_flight(),
                "shutdown: drain timeout expired, cancelling remaining runs"
            );
        }
        drained
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_with_no_runs_completes_immediately() {
        let tracker = RunTracker::new();
        let manager = ShutdownManager::new(tracker, Duration::from_millis(100));
        assert!(manager.drain().await);
    }

    #[tokio::test]
    async fn drain_waits_for_guard_release() {
        let tracker = RunTracker::new();
        let guard = tracker.clone().track();
        let manager = ShutdownManager::new(tracker.clone(), Duration::from_millis(500));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });
        assert!(manager.drain().await);
    }

    #[tokio::test]
    async fn drain_times_out_with_stuck_run() {
        let tracker = RunTracker::new();
        let _stuck = tracker.clone().track();
        let manager = ShutdownManager::new(tracker, Duration::from_millis(50));
        assert!(!manager.drain().await);
    }

    #[tokio::test]
    async fn stop_signal_reaches_subscribers() {
        let tracker = RunTracker::new();
        let manager = ShutdownManager::new(tracker, Duration::from_millis(10));
        let mut rx = manager.subscribe();
        assert!(!*rx.borrow());
        manager.drain().await;
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
