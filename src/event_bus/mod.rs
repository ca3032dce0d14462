//! Internal event bus.
//!
//! Audit and lifecycle events fan out to subscribers (the control-plane
//! HTTP server, channel notifiers) over a tokio broadcast channel.
//! Subscribers that fall behind drop messages rather than back-pressure
//! the publisher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Events published by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppEvent {
    RunStarted {
        run_id: String,
        agent: String,
        trigger: String,
    },
    RunCompleted {
        run_id: String,
        agent: String,
        phase: String,
    },
    ActionBlocked {
        run_id: String,
        agent: String,
        tool: String,
        target: String,
        reason: String,
    },
    ApprovalNeeded {
        run_id: String,
        agent: String,
        tool: String,
        target: String,
    },
    ActionSkipped {
        run_id: String,
        agent: String,
        tool: String,
        reason: String,
    },
    EscalationTriggered {
        run_id: String,
        agent: String,
        notify: String,
        reason: String,
    },
    /// The scheduler deferred a due agent because admission was denied.
    RunDeferred {
        agent: String,
        reason: String,
    },
    ShutdownStarted,
}

/// Fan-out publish/subscribe bus.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: AppEvent) -> Result<(), String>;
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;
}

/// [`EventBus`] implementation backed by a `tokio::sync::broadcast` channel.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<AppEvent>,
}

impl TokioBroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: AppEvent) -> Result<(), String> {
        // `send` errors only when there are no receivers — that is fine.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
