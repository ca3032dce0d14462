//! The flat action registry composed from every skill's Action Sheet.
//!
//! An action is *declared* iff its id is present here.  The registry is
//! built once per assembly and is immutable afterwards.

use std::collections::BTreeMap;

use crate::safety::matching::glob_match;
use crate::skills::{Action, Skill};

/// `id → Action` map over all declared actions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Action>,
}

impl ActionRegistry {
    /// Compose the registries of the given skills, in declaration order.
    /// A duplicate id across skills keeps the first declaration and yields
    /// a warning — silently replacing a declared constraint would widen it.
    pub fn from_skills<'a, I>(skills: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = &'a Skill>,
    {
        let mut actions = BTreeMap::new();
        let mut warnings = Vec::new();
        for skill in skills {
            let Some(sheet) = &skill.action_sheet else {
                continue;
            };
            for action in sheet {
                if actions.contains_key(&action.id) {
                    warnings.push(format!(
                        "skill '{}': action id '{}' already declared by an earlier skill; keeping the first",
                        skill.name, action.id
                    ));
                    continue;
                }
                actions.insert(action.id.clone(), action.clone());
            }
        }
        (Self { actions }, warnings)
    }

    pub fn get(&self, id: &str) -> Option<&Action> {
        self.actions.get(id)
    }

    /// Match a tool call against the declared actions.
    ///
    /// Match rule: the tool name equals `action.tool` or matches it as a
    /// glob; if the action declares a target pattern it must also match the
    /// extracted target.  Iteration order is the sorted id order, so the
    /// first match is deterministic.
    pub fn match_call(&self, tool: &str, target: &str) -> Option<&Action> {
        self.actions.values().find(|action| {
            let tool_ok = action.tool.eq_ignore_ascii_case(tool) || glob_match(&action.tool, tool);
            let target_ok =
                action.target_pattern.is_empty() || glob_match(&action.target_pattern, target);
            tool_ok && target_ok
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
