//! The safety engine's output types.

use serde::{Deserialize, Serialize};

use super::blast::Assessment;
use crate::skills::{Action, ActionTier};

/// Outcome status of an evaluated (and possibly executed) action.
///
/// The string forms are wire/audit contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    /// Eligible to execute (engine), or executed successfully (audit).
    Executed,
    Blocked,
    /// Suppressed by a cooldown — not a safety failure.
    Skipped,
    PendingApproval,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Executed => "executed",
            ActionStatus::Blocked => "blocked",
            ActionStatus::Skipped => "skipped",
            ActionStatus::PendingApproval => "pendingApproval",
            ActionStatus::Failed => "failed",
        }
    }
}

/// Per-step outcome strings.  Every field holds `pass`,
/// `BLOCKED[ (<qualifier>)]`, or `NEEDS_APPROVAL`; steps that blocked earlier
/// leave later fields at `pass`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreFlight {
    pub autonomy_check: String,
    pub data_impact_check: String,
    pub allow_list_check: String,
    pub data_protection: String,
    /// Human-readable summary of the deciding step.
    pub reason: String,
}

impl Default for PreFlight {
    fn default() -> Self {
        Self {
            autonomy_check: "pass".to_string(),
            data_impact_check: "pass".to_string(),
            allow_list_check: "pass".to_string(),
            data_protection: "pass".to_string(),
            reason: String::new(),
        }
    }
}

/// The complete pre-flight decision for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub needs_approval: bool,
    pub status: ActionStatus,
    pub tier: ActionTier,
    pub pre_flight: PreFlight,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_action: Option<Action>,
    #[serde(default)]
    pub block_reason: String,
    pub blast_radius: Assessment,
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, ActionStatus::Blocked)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, ActionStatus::Skipped)
    }
}
