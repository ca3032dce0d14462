//! Per-(agent, action, target) execution cooldowns.
//!
//! State is process-local by design: a restart clears all cooldowns.
//! The map is serialized by a single mutex; cooldown is best-effort and is
//! not a synchronization primitive — concurrent runs of the same agent may
//! race, and the last writer wins.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

type CooldownKey = (String, String, String);

/// Tracks the last execution time of declared actions.
#[derive(Default)]
pub struct CooldownTracker {
    last_executed: Mutex<HashMap<CooldownKey, Instant>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining cooldown for the tuple, if the prior execution is still
    /// inside `window`.
    pub fn remaining(
        &self,
        agent: &str,
        action_id: &str,
        target: &str,
        window: Duration,
    ) -> Option<Duration> {
        let key = (agent.to_string(), action_id.to_string(), target.to_string());
        let Ok(map) = self.last_executed.lock() else {
            return None;
        };
        let last = map.get(&key)?;
        let elapsed = last.elapsed();
        (elapsed < window).then(|| window - elapsed)
    }

    /// Record a real execution.  Called only after a tool actually ran —
    /// never on skip or block.
    pub fn record_execution(&self, agent: &str, action_id: &str, target: &str) {
        if let Ok(mut map) = self.last_executed.lock() {
            map.insert(
                (agent.to_string(), action_id.to_string(), target.to_string()),
                Instant::now(),
            );
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.last_executed.lock().map(|m| m.len()).unwrap_or(0)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
