//! Core agent declaration types.
//!
//! An [`Agent`] is the unit the control plane manages: identity plus the
//! policy envelope (guardrails, model budget, schedule) under which its runs
//! execute.  All fields are declarative — nothing here holds runtime state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Autonomy & approval ─────────────────────────────────────────────────────

/// The agent's autonomy ceiling, in increasing order of permitted impact.
///
/// Ordering is semantic: `Observe < Recommend < Safe < Destructive`, so the
/// safety engine can compare a required level against the agent's ceiling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Read-only observation; no mutations of any kind.
    #[default]
    Observe,
    /// May propose mutations in its report but not execute them.
    Recommend,
    /// May execute service-level mutations (restarts, scaling).
    Safe,
    /// May execute destructive mutations (deletes, node drains).
    Destructive,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Observe => "observe",
            AutonomyLevel::Recommend => "recommend",
            AutonomyLevel::Safe => "safe",
            AutonomyLevel::Destructive => "destructive",
        }
    }
}

/// What happens when an action exceeds the autonomy ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Over-ceiling actions are blocked outright.
    #[default]
    None,
    /// Over-ceiling actions are parked as pending-approval records.
    Queue,
    /// Over-ceiling actions are parked and a notification is emitted.
    Notify,
}

impl ApprovalMode {
    /// Whether this mode converts an autonomy block into an approval request.
    pub fn allows_approval(&self) -> bool {
        !matches!(self, ApprovalMode::None)
    }
}

// ─── Guardrails ──────────────────────────────────────────────────────────────

/// Declared escalation reaction for blocked actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    /// Where the escalation lands (e.g. a channel or parent-agent name).
    pub notify: String,
    /// Free-form reason template attached to escalation records.
    #[serde(default)]
    pub reason: String,
}

/// The policy envelope applied to every tool call an agent's runs propose.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Guardrails {
    pub autonomy: AutonomyLevel,
    /// Glob patterns over `"<tool> <target>"` that are explicitly permitted.
    /// An empty list means "no allowlist" — everything not otherwise blocked.
    pub allowed_actions: Vec<String>,
    /// Glob patterns over `"<tool> <target>"` that are always denied.
    pub denied_actions: Vec<String>,
    pub escalation: Option<Escalation>,
    pub max_iterations: u32,
    pub max_retries: u32,
    pub approval_mode: ApprovalMode,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            autonomy: AutonomyLevel::Observe,
            allowed_actions: Vec::new(),
            denied_actions: Vec::new(),
            escalation: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_retries: 2,
            approval_mode: ApprovalMode::None,
        }
    }
}

/// Default conversation-loop iteration cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default per-run token budget.
pub const DEFAULT_TOKEN_BUDGET: u64 = 50_000;

// ─── Model settings ──────────────────────────────────────────────────────────

/// Model capability tier.  The tier maps to a concrete model identifier at
/// wiring time; runs record the resolved identifier, not the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Cheapest tier for routine observation runs.
    Light,
    #[default]
    Standard,
    /// Largest tier for complex diagnosis.
    Advanced,
}

impl ModelTier {
    /// Built-in fallback model per tier, used when no tier config overrides it.
    pub fn default_model(&self) -> &'static str {
        match self {
            ModelTier::Light => "claude-haiku-4-5",
            ModelTier::Standard => "claude-sonnet-4-5",
            ModelTier::Advanced => "claude-opus-4-1",
        }
    }
}

/// Per-agent model budget and timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub tier: ModelTier,
    pub token_budget: u64,
    /// Wall-clock ceiling for a single run.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            tier: ModelTier::Standard,
            token_budget: DEFAULT_TOKEN_BUDGET,
            timeout: Duration::from_secs(600),
        }
    }
}

// ─── Schedule, skills, reporting ─────────────────────────────────────────────

/// Cron schedule plus the timezone it is evaluated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    pub cron: String,
    /// IANA timezone name (e.g. `"Europe/Berlin"`).  Empty means UTC.
    #[serde(default)]
    pub timezone: String,
}

/// Reference to a skill by name and source string (see the skills module for
/// the source grammar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRef {
    pub name: String,
    pub source: String,
}

/// Reporting policy — where run outcomes are delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reporting {
    pub on_success: String,
    pub on_failure: String,
    pub on_finding: String,
}

// ─── Agent ───────────────────────────────────────────────────────────────────

/// A declared, policy-constrained agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Absent for manual-only agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleSpec>,
    #[serde(default)]
    pub model: ModelSettings,
    /// Ordered — skill instructions are assembled in declaration order.
    #[serde(default)]
    pub skills: Vec<SkillRef>,
    #[serde(default)]
    pub guardrails: Guardrails,
    #[serde(default)]
    pub reporting: Reporting,
    /// Name of the environment this agent runs against.
    pub environment_ref: String,
}

impl Agent {
    /// Validate the declaration invariants that cannot be expressed in types.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("agent name must not be empty".into());
        }
        if self.model.token_budget < 1 {
            return Err(format!(
                "agent '{}': tokenBudget must be >= 1",
                self.name
            ));
        }
        if self.guardrails.max_iterations < 1 {
            return Err(format!(
                "agent '{}': maxIterations must be >= 1",
                self.name
            ));
        }
        Ok(())
    }

    /// `namespace/name`, the canonical identifier used in metrics labels and
    /// cooldown keys.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_agent() -> Agent {
        Agent {
            name: "watchman".to_string(),
            namespace: "default".to_string(),
            emoji: None,
            schedule: None,
            model: ModelSettings::default(),
            skills: vec![],
            guardrails: Guardrails::default(),
            reporting: Reporting::default(),
            environment_ref: "staging".to_string(),
        }
    }

    #[test]
    fn autonomy_ordering_is_semantic() {
        assert!(AutonomyLevel::Observe < AutonomyLevel::Recommend);
        assert!(AutonomyLevel::Recommend < AutonomyLevel::Safe);
        assert!(AutonomyLevel::Safe < AutonomyLevel::Destructive);
    }

    #[test]
    fn approval_mode_none_does_not_allow_approval() {
        assert!(!ApprovalMode::None.allows_approval());
        assert!(ApprovalMode::Queue.allows_approval());
        assert!(ApprovalMode::Notify.allows_approval());
    }

    #[test]
    fn validate_rejects_zero_token_budget() {
        let mut agent = minimal_agent();
        agent.model.token_budget = 0;
        assert!(agent.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_iterations() {
        let mut agent = minimal_agent();
        agent.guardrails.max_iterations = 0;
        assert!(agent.validate().is_err());
    }

    #[test]
    fn qualified_name_includes_namespace() {
        assert_eq!(minimal_agent().qualified_name(), "default/watchman");
    }

    #[test]
    fn guardrails_default_iterations() {
        assert_eq!(Guardrails::default().max_iterations, 10);
    }

    #[test]
    fn agent_round_trips_through_yaml() {
        let agent = minimal_agent();
        let yaml = serde_yaml::to_string(&agent).unwrap();
        let back: Agent = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.name, "watchman");
        assert_eq!(back.model.token_budget, DEFAULT_TOKEN_BUDGET);
    }
}
