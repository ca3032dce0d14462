//! Deterministic system-prompt assembly.
//!
//! `assemble` is a pure function over the agent declaration, its resolved
//! skills, the environment, and the resolved model identifier.  The same
//! inputs always produce the same prompt, the same action registry, and the
//! same warnings — assembly performs no I/O.

use std::fmt::Write as _;

use crate::agent::{Agent, AutonomyLevel, Environment};
use crate::safety::matching::glob_match;
use crate::skills::{ActionTier, Skill};

use super::registry::ActionRegistry;

/// Output of prompt assembly.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub action_registry: ActionRegistry,
    /// Static-check findings.  Warnings never fail assembly.
    pub warnings: Vec<String>,
}

/// Compose the system prompt and action registry.
pub fn assemble(
    agent: &Agent,
    skills: &[&Skill],
    environment: &Environment,
    resolved_model: &str,
) -> AssembledPrompt {
    let (action_registry, mut warnings) = ActionRegistry::from_skills(skills.iter().copied());
    warnings.extend(static_checks(agent, &action_registry));

    let mut p = String::new();

    // Identity.
    let emoji = agent
        .emoji
        .as_deref()
        .map(|e| format!("{e} "))
        .unwrap_or_default();
    let _ = writeln!(
        p,
        "You are {emoji}{}, an infrastructure agent in namespace '{}'.",
        agent.name, agent.namespace
    );
    let _ = writeln!(p, "Model: {resolved_model}.");
    p.push('\n');

    // Autonomy posture.
    let _ = writeln!(p, "## Autonomy");
    let _ = writeln!(p, "{}", autonomy_posture(agent.guardrails.autonomy));
    if !agent.guardrails.allowed_actions.is_empty() {
        let _ = writeln!(
            p,
            "Allowed action patterns: {}.",
            agent.guardrails.allowed_actions.join(", ")
        );
    }
    if !agent.guardrails.denied_actions.is_empty() {
        let _ = writeln!(
            p,
            "Denied action patterns (never attempt these): {}.",
            agent.guardrails.denied_actions.join(", ")
        );
    }
    p.push('\n');

    // Environment.
    let _ = writeln!(p, "## Environment: {}", environment.name);
    for endpoint in &environment.endpoints {
        let marker = if endpoint.internal { " (internal)" } else { "" };
        let _ = writeln!(p, "- endpoint {}: {}{marker}", endpoint.name, endpoint.url);
    }
    for group in &environment.namespace_groups {
        let _ = writeln!(
            p,
            "- namespaces [{}]: {}",
            group.name,
            group.namespaces.join(", ")
        );
    }
    for resource in &environment.data_resources {
        let _ = writeln!(
            p,
            "- data resource {} ({} in {}) — protected: never delete or mutate",
            resource.name, resource.kind, resource.namespace
        );
    }
    if !environment.mcp_servers.is_empty() {
        let _ = writeln!(p, "MCP servers:");
        for server in &environment.mcp_servers {
            let _ = writeln!(p, "- {}: {}", server.name, server.url);
        }
    }
    p.push('\n');

    // Skill instructions, in declaration order.
    for skill in skills {
        let _ = writeln!(p, "## Skill: {}", skill.name);
        let _ = writeln!(p, "{}", skill.instructions.trim());
        p.push('\n');
    }

    // Reporting policy.
    let _ = writeln!(p, "## Reporting");
    let _ = writeln!(
        p,
        "Prefix findings with CRITICAL:, WARNING:, or INFO: so they can be extracted."
    );
    if !agent.reporting.on_finding.is_empty() {
        let _ = writeln!(p, "On finding: {}.", agent.reporting.on_finding);
    }
    if !agent.reporting.on_failure.is_empty() {
        let _ = writeln!(p, "On failure: {}.", agent.reporting.on_failure);
    }
    if !agent.reporting.on_success.is_empty() {
        let _ = writeln!(p, "On success: {}.", agent.reporting.on_success);
    }

    AssembledPrompt {
        system_prompt: p,
        action_registry,
        warnings,
    }
}

fn autonomy_posture(level: AutonomyLevel) -> &'static str {
    match level {
        AutonomyLevel::Observe => {
            "You may only observe. Every mutation will be blocked before execution; \
             do not propose tool calls that change state."
        }
        AutonomyLevel::Recommend => {
            "You may observe and recommend. Describe mutations in your report instead \
             of executing them; mutating tool calls will be blocked."
        }
        AutonomyLevel::Safe => {
            "You may observe and perform service-level mutations (restarts, scaling) \
             declared in your skills. Destructive operations will be blocked."
        }
        AutonomyLevel::Destructive => {
            "You may perform declared mutations including destructive ones. Data \
             deletion is still blocked unconditionally."
        }
    }
}

/// Static registry-vs-guardrails checks.  Warnings only: a declared action
/// that cannot execute is a configuration smell, not an assembly failure.
fn static_checks(agent: &Agent, registry: &ActionRegistry) -> Vec<String> {
    let mut warnings = Vec::new();
    let autonomy = agent.guardrails.autonomy;
    for action in registry.iter() {
        match action.tier {
            ActionTier::ServiceMutation if autonomy == AutonomyLevel::Observe => {
                warnings.push(format!(
                    "action '{}' is a service-mutation but the agent autonomy is 'observe'; it will always be blocked",
                    action.id
                ));
            }
            ActionTier::DestructiveMutation if autonomy < AutonomyLevel::Destructive => {
                warnings.push(format!(
                    "action '{}' is a destructive-mutation but the agent autonomy is '{}'; it will always be blocked",
                    action.id,
                    autonomy.as_str()
                ));
            }
            ActionTier::DataMutation => {
                warnings.push(format!(
                    "action '{}' is a data-mutation; data mutations are never executed",
                    action.id
                ));
            }
            _ => {}
        }

        let qualified = format!("{} {}", action.tool, action.target_pattern);
        if agent
            .guardrails
            .denied_actions
            .iter()
            .any(|p| glob_match(p, &qualified) || glob_match(p, &action.tool))
        {
            warnings.push(format!(
                "action '{}' ('{}') matches a denied-actions pattern and will always be blocked",
                action.id,
                qualified.trim()
            ));
        }
    }
    warnings
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::environment::{DataResource, Endpoint, NamespaceGroup};
    use crate::agent::{Guardrails, ModelSettings, Reporting};
    use crate::skills::Action;

    fn agent(autonomy: AutonomyLevel) -> Agent {
        Agent {
            name: "watchman".to_string(),
            namespace: "ops".to_string(),
            emoji: Some("🛰️".to_string()),
            schedule: None,
            model: ModelSettings::default(),
            skills: vec![],
            guardrails: Guardrails {
                autonomy,
                denied_actions: vec!["kubectl.delete*".to_string()],
                ..Guardrails::default()
            },
            reporting: Reporting {
                on_finding: "notify #ops".to_string(),
                ..Reporting::default()
            },
            environment_ref: "staging".to_string(),
        }
    }

    fn environment() -> Environment {
        Environment {
            name: "staging".to_string(),
            endpoints: vec![Endpoint {
                name: "grafana".to_string(),
                url: "https://grafana.internal".to_string(),
                internal: true,
            }],
            namespace_groups: vec![NamespaceGroup {
                name: "apps".to_string(),
                namespaces: vec!["backstage".to_string(), "shop".to_string()],
            }],
            data_resources: vec![DataResource {
                name: "orders-db".to_string(),
                kind: "CloudNativePGCluster".to_string(),
                namespace: "prod".to_string(),
            }],
            mcp_servers: vec![],
            credentials: vec![],
        }
    }

    fn skill(name: &str, actions: Vec<Action>) -> Skill {
        Skill {
            name: name.to_string(),
            description: "d".to_string(),
            version: "1.0.0".to_string(),
            license: String::new(),
            tags: vec![],
            instructions: format!("Instructions for {name}."),
            action_sheet: if actions.is_empty() {
                None
            } else {
                Some(actions)
            },
        }
    }

    fn act(id: &str, tool: &str, tier: ActionTier) -> Action {
        Action {
            id: id.to_string(),
            description: String::new(),
            tool: tool.to_string(),
            target_pattern: String::new(),
            tier,
            cooldown: None,
            data_impact: String::new(),
        }
    }

    #[test]
    fn assembly_is_deterministic() {
        let a = agent(AutonomyLevel::Safe);
        let env = environment();
        let s1 = skill("one", vec![]);
        let s2 = skill("two", vec![]);
        let first = assemble(&a, &[&s1, &s2], &env, "claude-sonnet-4-5");
        let second = assemble(&a, &[&s1, &s2], &env, "claude-sonnet-4-5");
        assert_eq!(first.system_prompt, second.system_prompt);
    }

    #[test]
    fn prompt_contains_all_sections_in_order() {
        let a = agent(AutonomyLevel::Observe);
        let env = environment();
        let s1 = skill("alpha", vec![]);
        let s2 = skill("beta", vec![]);
        let out = assemble(&a, &[&s1, &s2], &env, "m");
        let p = &out.system_prompt;

        let identity = p.find("watchman").unwrap();
        let autonomy = p.find("## Autonomy").unwrap();
        let env_pos = p.find("## Environment").unwrap();
        let alpha = p.find("## Skill: alpha").unwrap();
        let beta = p.find("## Skill: beta").unwrap();
        let reporting = p.find("## Reporting").unwrap();
        assert!(identity < autonomy && autonomy < env_pos);
        assert!(env_pos < alpha && alpha < beta && beta < reporting);
    }

    #[test]
    fn internal_endpoints_and_protected_resources_are_marked() {
        let out = assemble(
            &agent(AutonomyLevel::Observe),
            &[],
            &environment(),
            "m",
        );
        assert!(out.system_prompt.contains("(internal)"));
        assert!(out.system_prompt.contains("protected"));
        assert!(out.system_prompt.contains("orders-db"));
    }

    #[test]
    fn service_mutation_under_observe_warns() {
        let s = skill(
            "s",
            vec![act("restart", "kubectl.rollout", ActionTier::ServiceMutation)],
        );
        let out = assemble(&agent(AutonomyLevel::Observe), &[&s], &environment(), "m");
        assert!(out.warnings.iter().any(|w| w.contains("service-mutation")));
    }

    #[test]
    fn destructive_below_destructive_warns() {
        let s = skill(
            "s",
            vec![act("evict", "kubectl.evict", ActionTier::DestructiveMutation)],
        );
        let out = assemble(&agent(AutonomyLevel::Safe), &[&s], &environment(), "m");
        assert!(out.warnings.iter().any(|w| w.contains("destructive-mutation")));

        let out = assemble(&agent(AutonomyLevel::Destructive), &[&s], &environment(), "m");
        assert!(!out.warnings.iter().any(|w| w.contains("destructive-mutation")));
    }

    #[test]
    fn data_mutation_always_warns() {
        let s = skill("s", vec![act("w", "sql.exec", ActionTier::DataMutation)]);
        let out = assemble(&agent(AutonomyLevel::Destructive), &[&s], &environment(), "m");
        assert!(out.warnings.iter().any(|w| w.contains("data-mutation")));
    }

    #[test]
    fn denied_pattern_overlap_warns() {
        let s = skill(
            "s",
            vec![act("del", "kubectl.delete", ActionTier::DestructiveMutation)],
        );
        let out = assemble(&agent(AutonomyLevel::Destructive), &[&s], &environment(), "m");
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("denied-actions")));
    }
}
