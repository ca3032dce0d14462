//! The pre-flight pipeline.
//!
//! Steps run in fixed order; the first step that blocks wins and the engine
//! short-circuits with a `blocked` (or `pendingApproval` / `skipped`)
//! decision.  The blast-radius assessment is always computed and attached
//! but never short-circuits by itself.
//!
//! `evaluate` is pure apart from the cooldown read, so it is safe to call
//! concurrently.  The engine itself is constructed per run; only the
//! cooldown tracker outlives a run.

use std::sync::Arc;

use serde_json::Value;

use crate::agent::{AutonomyLevel, DataResourceIndex, Guardrails};
use crate::prompt::registry::ActionRegistry;
use crate::skills::ActionTier;
use crate::tools::{ToolDomain, ToolRegistry};

use super::blast::{self, BlastInput, BlastTarget, MutationDepth};
use super::cooldown::CooldownTracker;
use super::decision::{ActionStatus, Decision, PreFlight};
use super::matching::glob_match;
use super::protection::{self, ProtectionAction, ProtectionEngine};

/// Tool-name segments classified as read operations.
const READ_VERBS: &[&str] = &[
    "get", "list", "describe", "logs", "watch", "top", "read", "status", "exists", "head",
];

/// Tool-name fragments classified as destructive operations.
const DESTRUCTIVE_VERBS: &[&str] = &[
    "delete", "destroy", "remove", "drain", "terminate", "kill", "purge", "evict", "wipe", "drop",
];

pub struct SafetyEngine {
    agent: String,
    guardrails: Guardrails,
    registry: ActionRegistry,
    data_index: DataResourceIndex,
    protection: Option<ProtectionEngine>,
    tools: Option<Arc<ToolRegistry>>,
    cooldowns: Arc<CooldownTracker>,
    /// Roles attributed to the run when scoring blast radius.  Agent runs
    /// are never admin.
    actor_roles: Vec<String>,
}

impl SafetyEngine {
    pub fn new(
        agent: impl Into<String>,
        guardrails: Guardrails,
        registry: ActionRegistry,
        data_index: DataResourceIndex,
        cooldowns: Arc<CooldownTracker>,
    ) -> Self {
        Self {
            agent: agent.into(),
            guardrails,
            registry,
            data_index,
            protection: None,
            tools: None,
            cooldowns,
            actor_roles: vec!["agent".to_string()],
        }
    }

    /// Attach user-defined protection classes.
    pub fn with_protection(mut self, protection: ProtectionEngine) -> Self {
        self.protection = Some(protection);
        self
    }

    /// Attach the tool registry so classifiable tools can refine tiers.
    pub fn with_tool_registry(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Evaluate a tool call by name and extracted target.
    pub fn evaluate(&self, tool_name: &str, target: &str) -> Decision {
        self.evaluate_call(tool_name, target, &Value::Null)
    }

    /// Evaluate with the raw args available for tool-level classification.
    pub fn evaluate_call(&self, tool_name: &str, target: &str, args: &Value) -> Decision {
        let mut pre_flight = PreFlight::default();

        // 1. Match against the action registry; adopt the declared tier or
        //    fall back to the tool-name heuristic.
        let matched = self.registry.match_call(tool_name, target).cloned();
        let mut tier = matched
            .as_ref()
            .map(|a| a.tier)
            .unwrap_or_else(|| classify_by_name(tool_name));

        // 2. Blast radius — always computed, never a short-circuit.
        let domain = self.tool_domain(tool_name);
        let blast = blast::assess(&BlastInput {
            tier: Some(tier),
            mutation_depth: mutation_depth(domain, tier),
            actor_roles: self.actor_roles.clone(),
            targets: vec![BlastTarget {
                env: target_env(target).to_string(),
                domain: domain_label(domain).to_string(),
            }],
        });

        // 3. Hardcoded data protection.
        if let Some(reason) = protection::hardcoded_block_reason(tool_name, target) {
            pre_flight.data_protection = "BLOCKED".to_string();
            pre_flight.reason = reason.clone();
            return self.blocked(ActionTier::DataMutation, pre_flight, matched, reason, blast);
        }

        // 4. Configurable protection classes.
        if let Some(engine) = &self.protection {
            if let Some(hit) = engine.evaluate(domain_label(domain), target) {
                match hit.action {
                    ProtectionAction::Block => {
                        pre_flight.data_protection = format!("BLOCKED ({})", hit.class);
                        let reason =
                            format!("protection class '{}' blocks '{}'", hit.class, hit.pattern);
                        pre_flight.reason = reason.clone();
                        return self.blocked(tier, pre_flight, matched, reason, blast);
                    }
                    ProtectionAction::Approve => {
                        pre_flight.data_protection = "NEEDS_APPROVAL".to_string();
                        pre_flight.reason =
                            format!("protection class '{}' requires approval", hit.class);
                        return self.pending_approval(tier, pre_flight, matched, blast);
                    }
                    ProtectionAction::Audit => {
                        tracing::info!(
                            agent = %self.agent,
                            class = %hit.class,
                            tool = tool_name,
                            target,
                            "protection class audit marker"
                        );
                    }
                }
            }
        }

        // 5. Tool-level classification override.
        if let Some(tools) = &self.tools {
            if let Some(tool) = tools.get(tool_name) {
                if let Some(classification) = tool.classify_action(args) {
                    if classification.blocked {
                        pre_flight.data_protection = "BLOCKED (tool classification)".to_string();
                        pre_flight.reason = classification.block_reason.clone();
                        return self.blocked(
                            ActionTier::DataMutation,
                            pre_flight,
                            matched,
                            classification.block_reason,
                            blast,
                        );
                    }
                    tier = classification.tier;
                }
            }
        }

        // 6. Data-resource impact.  Reads and service mutations are not
        //    blocked by this step.
        if matches!(
            tier,
            ActionTier::DestructiveMutation | ActionTier::DataMutation
        ) && !self.data_index.is_empty()
        {
            if let Some(namespace) = target_namespace(target) {
                if self.data_index.namespace_has_data(namespace) {
                    pre_flight.data_impact_check = "BLOCKED (data namespace)".to_string();
                    let reason = format!(
                        "destructive mutation in namespace '{namespace}' which contains declared data resources"
                    );
                    pre_flight.reason = reason.clone();
                    return self.blocked(tier, pre_flight, matched, reason, blast);
                }
            }
            if let Some(resource) = self.data_index.target_names_resource(target) {
                pre_flight.data_impact_check = "BLOCKED (data resource)".to_string();
                let reason = format!("mutation names declared data resource '{resource}'");
                pre_flight.reason = reason.clone();
                return self.blocked(tier, pre_flight, matched, reason, blast);
            }
        }

        // 7. Autonomy ceiling.  Data mutations are blocked unconditionally;
        //    other over-ceiling actions may fall back to approval.
        if tier == ActionTier::DataMutation {
            pre_flight.autonomy_check = "BLOCKED (data-mutation)".to_string();
            let reason = "data mutations are never allowed".to_string();
            pre_flight.reason = reason.clone();
            return self.blocked(tier, pre_flight, matched, reason, blast);
        }
        if let Some(required) = required_autonomy(tier) {
            if required > self.guardrails.autonomy {
                if self.guardrails.approval_mode.allows_approval() {
                    pre_flight.autonomy_check = "NEEDS_APPROVAL".to_string();
                    pre_flight.reason = format!(
                        "requires autonomy '{}' but agent has '{}'",
                        required.as_str(),
                        self.guardrails.autonomy.as_str()
                    );
                    return self.pending_approval(tier, pre_flight, matched, blast);
                }
                pre_flight.autonomy_check = "BLOCKED (autonomy)".to_string();
                let reason = format!(
                    "tier '{}' requires autonomy '{}' but agent has '{}'",
                    tier.as_str(),
                    required.as_str(),
                    self.guardrails.autonomy.as_str()
                );
                pre_flight.reason = reason.clone();
                return self.blocked(tier, pre_flight, matched, reason, blast);
            }
        }

        // 8. Deny list — checked before the allow list.
        let qualified = format!("{tool_name} {target}");
        if self
            .guardrails
            .denied_actions
            .iter()
            .any(|p| glob_match(p, tool_name) || glob_match(p, &qualified))
        {
            pre_flight.allow_list_check = "BLOCKED (deny-list)".to_string();
            let reason = format!("'{qualified}' matches a denied-actions pattern");
            pre_flight.reason = reason.clone();
            return self.blocked(tier, pre_flight, matched, reason, blast);
        }

        // 9. Allow list — enforced for mutations only, and only when set.
        if tier.is_mutation()
            && !self.guardrails.allowed_actions.is_empty()
            && !self
                .guardrails
                .allowed_actions
                .iter()
                .any(|p| glob_match(p, tool_name) || glob_match(p, &qualified))
        {
            pre_flight.allow_list_check = "BLOCKED (not-allowlisted)".to_string();
            let reason = format!("'{qualified}' matches no allowed-actions pattern");
            pre_flight.reason = reason.clone();
            return self.blocked(tier, pre_flight, matched, reason, blast);
        }

        // 10. Cooldown — a skip, not a block.
        if let Some(action) = &matched {
            if let Some(window) = action.cooldown {
                if let Some(remaining) =
                    self.cooldowns
                        .remaining(&self.agent, &action.id, target, window)
                {
                    pre_flight.reason = format!(
                        "cooldown for action '{}' active ({}s remaining)",
                        action.id,
                        remaining.as_secs().max(1)
                    );
                    return Decision {
                        allowed: false,
                        needs_approval: false,
                        status: ActionStatus::Skipped,
                        tier,
                        block_reason: pre_flight.reason.clone(),
                        pre_flight,
                        matched_action: matched,
                        blast_radius: blast,
                    };
                }
            }
        }

        // 11. Undeclared mutations are blocked: mutations execute only
        //     through declared actions.
        if matched.is_none() && tier.is_mutation() {
            pre_flight.allow_list_check = "BLOCKED (undeclared)".to_string();
            let reason = format!("undeclared mutation '{qualified}' has no matching declared action");
            pre_flight.reason = reason.clone();
            return self.blocked(tier, pre_flight, None, reason, blast);
        }

        Decision {
            allowed: true,
            needs_approval: false,
            status: ActionStatus::Executed,
            tier,
            pre_flight,
            matched_action: matched,
            block_reason: String::new(),
            blast_radius: blast,
        }
    }

    /// Record a real execution for cooldown purposes.  Called by the
    /// orchestrator after the tool ran — never on skip or block.
    pub fn record_execution(&self, action_id: &str, target: &str) {
        self.cooldowns.record_execution(&self.agent, action_id, target);
    }

    // ── Internal ─────────────────────────────────────────────────────────────

    fn blocked(
        &self,
        tier: ActionTier,
        pre_flight: PreFlight,
        matched: Option<crate::skills::Action>,
        reason: String,
        blast: super::blast::Assessment,
    ) -> Decision {
        Decision {
            allowed: false,
            needs_approval: false,
            status: ActionStatus::Blocked,
            tier,
            pre_flight,
            matched_action: matched,
            block_reason: reason,
            blast_radius: blast,
        }
    }

    fn pending_approval(
        &self,
        tier: ActionTier,
        pre_flight: PreFlight,
        matched: Option<crate::skills::Action>,
        blast: super::blast::Assessment,
    ) -> Decision {
        Decision {
            allowed: false,
            needs_approval: true,
            status: ActionStatus::PendingApproval,
            tier,
            block_reason: pre_flight.reason.clone(),
            pre_flight,
            matched_action: matched,
            blast_radius: blast,
        }
    }

    fn tool_domain(&self, tool_name: &str) -> ToolDomain {
        if let Some(tools) = &self.tools {
            if let Some(tool) = tools.get(tool_name) {
                if let Some(capability) = tool.capability() {
                    return capability.domain;
                }
            }
        }
        domain_from_name(tool_name)
    }
}

// ─── Pure helpers ────────────────────────────────────────────────────────────

/// Heuristic tier classification for tools with no declared action.
fn classify_by_name(tool_name: &str) -> ActionTier {
    let lowered = tool_name.to_lowercase();
    let segments: Vec<&str> = lowered.split(['.', '_', '-']).collect();
    if segments.iter().any(|s| READ_VERBS.contains(s)) {
        return ActionTier::Read;
    }
    if DESTRUCTIVE_VERBS.iter().any(|v| lowered.contains(v)) {
        return ActionTier::DestructiveMutation;
    }
    ActionTier::ServiceMutation
}

/// Minimum autonomy per tier; `None` means never allowed.
fn required_autonomy(tier: ActionTier) -> Option<AutonomyLevel> {
    match tier {
        ActionTier::Read => Some(AutonomyLevel::Observe),
        ActionTier::ServiceMutation => Some(AutonomyLevel::Safe),
        ActionTier::DestructiveMutation => Some(AutonomyLevel::Destructive),
        ActionTier::DataMutation => None,
    }
}

fn domain_from_name(tool_name: &str) -> ToolDomain {
    let prefix = tool_name.split('.').next().unwrap_or("").to_lowercase();
    match prefix.as_str() {
        "kubectl" | "k8s" | "kubernetes" => ToolDomain::Kubernetes,
        "http" | "https" | "curl" => ToolDomain::Http,
        "ssh" => ToolDomain::Ssh,
        "sql" | "db" | "postgres" | "mysql" => ToolDomain::Sql,
        "mcp" => ToolDomain::Mcp,
        "state" => ToolDomain::State,
        "iam" | "identity" => ToolDomain::Identity,
        _ => ToolDomain::Other,
    }
}

fn domain_label(domain: ToolDomain) -> &'static str {
    match domain {
        ToolDomain::Kubernetes => "kubernetes",
        ToolDomain::Http => "http",
        ToolDomain::Ssh => "ssh",
        ToolDomain::Sql => "sql",
        ToolDomain::Mcp => "mcp",
        ToolDomain::State => "state",
        ToolDomain::Identity => "identity",
        ToolDomain::Other => "other",
    }
}

fn mutation_depth(domain: ToolDomain, tier: ActionTier) -> MutationDepth {
    if tier == ActionTier::DataMutation {
        return MutationDepth::Data;
    }
    match domain {
        ToolDomain::Kubernetes | ToolDomain::Other => MutationDepth::Service,
        ToolDomain::Sql | ToolDomain::State => MutationDepth::Data,
        ToolDomain::Http | ToolDomain::Mcp | ToolDomain::Ssh => MutationDepth::Network,
        ToolDomain::Identity => MutationDepth::Identity,
    }
}

/// Environment classification of a target, for blast scoring.
fn target_env(target: &str) -> &'static str {
    if target.to_lowercase().contains("prod") {
        "prod"
    } else {
        "default"
    }
}

/// Namespace named by a `-n <ns>` argument inside the target, if any.
fn target_namespace(target: &str) -> Option<&str> {
    let mut parts = target.split_whitespace();
    while let Some(part) = parts.next() {
        if part == "-n" || part == "--namespace" {
            return parts.next();
        }
    }
    None
}

// ─── Tests ───────────────────────────────────────────────────────────────────
