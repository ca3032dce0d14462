//! The typed audit record produced by every run.
//!
//! A `Run` is owned by its agent (the owner reference is stamped at
//! creation so deleting the agent cascades).  After the single transition
//! to a terminal phase the record is immutable except for retention-driven
//! deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::safety::{ActionStatus, PreFlight};
use crate::skills::ActionTier;

// ─── Phases & triggers ───────────────────────────────────────────────────────

/// Lifecycle phase of a run.  `Pending` and `Running` are transient; the
/// rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Escalated,
    Blocked,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunPhase::Pending | RunPhase::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Pending => "pending",
            RunPhase::Running => "running",
            RunPhase::Succeeded => "succeeded",
            RunPhase::Failed => "failed",
            RunPhase::Escalated => "escalated",
            RunPhase::Blocked => "blocked",
        }
    }
}

/// What started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
    Event,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
            Trigger::Event => "event",
        }
    }
}

// ─── Findings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Critical,
    Warning,
    Info,
}

impl FindingSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Critical => "critical",
            FindingSeverity::Warning => "warning",
            FindingSeverity::Info => "info",
        }
    }
}

/// One finding extracted from the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: FindingSeverity,
    pub message: String,
}

// ─── Action records ──────────────────────────────────────────────────────────

/// Escalation stanza attached to a blocked action when the agent declares
/// an escalation reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRecord {
    pub notify: String,
    pub reason: String,
}

/// One evaluated (and possibly executed) tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// Monotonic within the run, in the order the model emitted the calls.
    pub seq: u32,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub target: String,
    pub tier: ActionTier,
    pub pre_flight_check: PreFlight,
    pub status: ActionStatus,
    /// Sanitized, truncated result (or error / block reason).
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationRecord>,
}

// ─── Usage & guardrail summaries ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub iterations: u32,
    pub wall_clock_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailSummary {
    pub autonomy_ceiling: String,
    pub checks_performed: u32,
    pub actions_blocked: u32,
    pub escalations_triggered: u32,
    /// Tokens consumed out of the budget.
    pub budget_used: u64,
}

// ─── Run ─────────────────────────────────────────────────────────────────────

/// The complete audit record for one execution of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    /// Owner reference: `namespace/name` of the agent.
    pub agent_ref: String,
    pub environment_ref: String,
    pub trigger: Trigger,
    pub model_used: String,
    pub phase: RunPhase,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    pub actions: Vec<ActionRecord>,
    pub findings: Vec<Finding>,
    pub report: String,
    pub usage: Usage,
    pub guardrails: GuardrailSummary,
}

impl Run {
    pub fn new(agent_ref: &str, environment_ref: &str, trigger: Trigger, model: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_ref: agent_ref.to_string(),
            environment_ref: environment_ref.to_string(),
            trigger,
            model_used: model.to_string(),
            phase: RunPhase::Pending,
            start_time: Utc::now(),
            completion_time: None,
            actions: Vec::new(),
            findings: Vec::new(),
            report: String::new(),
            usage: Usage::default(),
            guardrails: GuardrailSummary::default(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(!RunPhase::Pending.is_terminal());
        assert!(!RunPhase::Running.is_terminal());
        for phase in [
            RunPhase::Succeeded,
            RunPhase::Failed,
            RunPhase::Escalated,
            RunPhase::Blocked,
        ] {
            assert!(phase.is_terminal(), "{phase:?}");
        }
    }

    #[test]
    fn new_run_is_pending_with_fresh_id() {
        let a = Run::new("ops/watchman", "staging", Trigger::Manual, "m");
        let b = Run::new("ops/watchman", "staging", Trigger::Manual, "m");
        assert_eq!(a.phase, RunPhase::Pending);
        assert_ne!(a.id, b.id);
        assert!(a.completion_time.is_none());
    }

    #[test]
    fn run_serializes_with_camel_case_keys() {
        let run = Run::new("ops/watchman", "staging", Trigger::Scheduled, "m");
        let value = serde_json::to_value(&run).unwrap();
        assert!(value.get("agentRef").is_some());
        assert!(value.get("modelUsed").is_some());
        assert_eq!(value.get("trigger").unwrap(), "scheduled");
    }
}
