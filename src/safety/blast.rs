//! Deterministic blast-radius assessment.
//!
//! Computed for every evaluated tool call before execution.  The assessment
//! never performs I/O and two calls with identical inputs always produce
//! identical output — it is a pure scoring function over the action tier,
//! mutation depth, actor roles, and target set.

use serde::{Deserialize, Serialize};

use crate::skills::ActionTier;

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// How deep a mutation reaches, by the domain it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MutationDepth {
    #[default]
    Service,
    Data,
    Network,
    Identity,
}

impl MutationDepth {
    fn weight(&self) -> f64 {
        match self {
            MutationDepth::Service => 0.10,
            MutationDepth::Data => 0.20,
            MutationDepth::Network => 0.25,
            MutationDepth::Identity => 0.30,
        }
    }
}

/// One target the call touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlastTarget {
    /// Environment classification (e.g. `prod`, `staging`).
    pub env: String,
    /// Domain label (e.g. `ssh`, `sql`, `kubernetes`).
    pub domain: String,
}

/// Inputs to the assessment.  `tier: None` means the tier could not be
/// established — scored as the worst case (fail-closed).
#[derive(Debug, Clone)]
pub struct BlastInput {
    pub tier: Option<ActionTier>,
    pub mutation_depth: MutationDepth,
    pub actor_roles: Vec<String>,
    pub targets: Vec<BlastTarget>,
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlastLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// The scored assessment plus the requirements derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub score: f64,
    pub level: BlastLevel,
    pub typed_confirmation: bool,
    pub approval_required: bool,
    pub cooldown_required: bool,
    /// `false` only when a critical-level action is attempted by a
    /// non-admin actor, in which case `decision` is `deny`.
    pub max_allowed: bool,
    pub decision: String,
}

fn tier_weight(tier: Option<ActionTier>) -> f64 {
    match tier {
        Some(ActionTier::Read) => 0.05,
        Some(ActionTier::ServiceMutation) => 0.35,
        Some(ActionTier::DestructiveMutation) => 0.65,
        Some(ActionTier::DataMutation) => 0.75,
        // Unknown tier: fail closed.
        None => 0.75,
    }
}

/// Score the call and derive requirements.
pub fn assess(input: &BlastInput) -> Assessment {
    let prod_targets = input
        .targets
        .iter()
        .filter(|t| t.env.eq_ignore_ascii_case("prod"))
        .count() as f64;
    let target_count = input.targets.len() as f64;
    let cross_domain = {
        let mut domains: Vec<&str> = input.targets.iter().map(|t| t.domain.as_str()).collect();
        domains.sort_unstable();
        domains.dedup();
        domains.len() > 1
    };

    let mut score = tier_weight(input.tier);
    score += input.mutation_depth.weight();
    score += (0.15 * prod_targets).min(0.30);
    score += (0.05 * (target_count - 1.0).max(0.0)).min(0.20);
    if cross_domain {
        score += 0.10;
    }
    let score = score.clamp(0.0, 1.0);

    let level = if score < 0.30 {
        BlastLevel::Low
    } else if score < 0.60 {
        BlastLevel::Medium
    } else if score < 0.80 {
        BlastLevel::High
    } else {
        BlastLevel::Critical
    };

    let tier_is_heavy = matches!(
        input.tier,
        Some(ActionTier::DestructiveMutation) | Some(ActionTier::DataMutation)
    );
    let typed_confirmation = level >= BlastLevel::High || tier_is_heavy;
    let approval_required = level != BlastLevel::Low && input.tier != Some(ActionTier::Read);
    let cooldown_required = level == BlastLevel::Critical;

    let is_admin = input.actor_roles.iter().any(|r| r.eq_ignore_ascii_case("admin"));
    let max_allowed = !(level == BlastLevel::Critical && !is_admin);

    Assessment {
        score,
        level,
        typed_confirmation,
        approval_required,
        cooldown_required,
        max_allowed,
        decision: if max_allowed { "allow" } else { "deny" }.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
