//! Skill and Action Sheet types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::skills::error::{SkillError, SkillResult};

// ─── ActionTier ──────────────────────────────────────────────────────────────

/// Severity tier of a declared action, in increasing order of impact.
///
/// The string forms are wire/audit contract: `read`, `service-mutation`,
/// `destructive-mutation`, `data-mutation`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum ActionTier {
    #[default]
    Read,
    ServiceMutation,
    DestructiveMutation,
    DataMutation,
}

impl ActionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTier::Read => "read",
            ActionTier::ServiceMutation => "service-mutation",
            ActionTier::DestructiveMutation => "destructive-mutation",
            ActionTier::DataMutation => "data-mutation",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, ActionTier::Read)
    }
}

// ─── Action / ActionSheet ────────────────────────────────────────────────────

/// One declared tool action in a skill's Action Sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Unique within the composed action registry.
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Tool name or glob the action applies to (e.g. `kubectl.get`,
    /// `http.*`).
    pub tool: String,
    /// Optional glob over the extracted target; empty matches any target.
    #[serde(default)]
    pub target_pattern: String,
    #[serde(default)]
    pub tier: ActionTier,
    /// Minimum time between executions of this action against the same
    /// target.  `None` means no cooldown.
    #[serde(default, with = "humantime_serde::option")]
    pub cooldown: Option<Duration>,
    /// Free-form note on what data the action touches; surfaced in audit.
    #[serde(default)]
    pub data_impact: String,
}

/// The declared list of permitted actions carried by a skill.
pub type ActionSheet = Vec<Action>;

// ─── Skill ───────────────────────────────────────────────────────────────────

/// A validated skill: frontmatter metadata plus the markdown instruction body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// The markdown body following the frontmatter.
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_sheet: Option<ActionSheet>,
}

/// Non-fatal issues found while validating a skill.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

/// Frontmatter shape parsed out of `SKILL.md`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillFrontmatter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    license: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl Skill {
    /// Parse `SKILL.md` content (YAML frontmatter between `---` delimiters
    /// followed by a markdown body) plus an optional `actions.yaml`.
    pub fn parse(skill_md: &str, actions_yaml: Option<&str>) -> SkillResult<(Self, ValidationReport)> {
        let trimmed = skill_md.trim_start();
        if !trimmed.starts_with("---") {
            return Err(SkillError::Parse(
                "SKILL.md must start with YAML frontmatter (---)".to_string(),
            ));
        }

        let after_open = &trimmed[3..];
        let close = after_open.find("\n---").ok_or_else(|| {
            SkillError::Parse("missing closing --- for YAML frontmatter".to_string())
        })?;
        let yaml = &after_open[..close];
        let body = after_open[close + 4..].trim().to_string();

        let fm: SkillFrontmatter = serde_yaml::from_str(yaml)?;

        let action_sheet = match actions_yaml {
            Some(raw) => Some(serde_yaml::from_str::<ActionSheet>(raw)?),
            None => None,
        };

        let skill = Skill {
            name: fm.name,
            description: fm.description,
            version: fm.version,
            license: fm.license,
            tags: fm.tags,
            instructions: body,
            action_sheet,
        };
        let report = skill.validate()?;
        Ok((skill, report))
    }

    /// Hard validation: returns the warning report on success, an error on
    /// any fatal defect.
    pub fn validate(&self) -> SkillResult<ValidationReport> {
        if self.name.is_empty() {
            return Err(SkillError::Invalid("skill name is empty".to_string()));
        }
        if self.description.is_empty() {
            return Err(SkillError::Invalid(format!(
                "skill '{}': description is empty",
                self.name
            )));
        }
        if self.instructions.is_empty() {
            return Err(SkillError::Invalid(format!(
                "skill '{}': instructions are empty",
                self.name
            )));
        }

        if let Some(sheet) = &self.action_sheet {
            let mut seen = std::collections::HashSet::new();
            for action in sheet {
                if !seen.insert(action.id.as_str()) {
                    return Err(SkillError::Invalid(format!(
                        "skill '{}': duplicate action id '{}'",
                        self.name, action.id
                    )));
                }
                if action.tool.is_empty() {
                    return Err(SkillError::Invalid(format!(
                        "skill '{}': action '{}' is missing a tool",
                        self.name, action.id
                    )));
                }
            }
        }

        let mut report = ValidationReport::default();
        if self.version.is_empty() {
            report
                .warnings
                .push(format!("skill '{}': missing version", self.name));
        }
        if self.license.is_empty() {
            report
                .warnings
                .push(format!("skill '{}': missing license", self.name));
        }
        if self.tags.is_empty() {
            report
                .warnings
                .push(format!("skill '{}': missing tags", self.name));
        }
        Ok(report)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
name: pod-watch
description: Watches pods and reports crash loops
version: 1.2.0
license: MIT
tags: [kubernetes, observability]
---

# Pod Watch

Check pod health in the configured namespaces.
"#;

    const SAMPLE_ACTIONS: &str = r#"
- id: list-pods
  description: List pods in a namespace
  tool: kubectl.get
  targetPattern: "pods*"
  tier: read
- id: restart-deploy
  tool: kubectl.rollout
  tier: service-mutation
  cooldown: 10m
"#;

    #[test]
    fn parses_frontmatter_and_body() {
        let (skill, report) = Skill::parse(SAMPLE, None).unwrap();
        assert_eq!(skill.name, "pod-watch");
        assert_eq!(skill.version, "1.2.0");
        assert!(skill.instructions.contains("Check pod health"));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn parses_action_sheet() {
        let (skill, _) = Skill::parse(SAMPLE, Some(SAMPLE_ACTIONS)).unwrap();
        let sheet = skill.action_sheet.unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[0].tier, ActionTier::Read);
        assert_eq!(
            sheet[1].cooldown,
            Some(std::time::Duration::from_secs(600))
        );
    }

    #[test]
    fn missing_frontmatter_is_a_parse_error() {
        let err = Skill::parse("# no frontmatter", None).unwrap_err();
        assert!(matches!(err, SkillError::Parse(_)));
    }

    #[test]
    fn empty_description_is_invalid() {
        let md = "---\nname: x\n---\nbody";
        let err = Skill::parse(md, None).unwrap_err();
        assert!(matches!(err, SkillError::Invalid(_)));
    }

    #[test]
    fn duplicate_action_ids_are_invalid() {
        let actions = "- id: a\n  tool: t\n- id: a\n  tool: t2\n";
        let err = Skill::parse(SAMPLE, Some(actions)).unwrap_err();
        assert!(err.to_string().contains("duplicate action id"));
    }

    #[test]
    fn unknown_tier_is_a_parse_error() {
        let actions = "- id: a\n  tool: t\n  tier: catastrophic\n";
        assert!(Skill::parse(SAMPLE, Some(actions)).is_err());
    }

    #[test]
    fn missing_version_warns_but_validates() {
        let md = "---\nname: x\ndescription: d\n---\nbody";
        let (_, report) = Skill::parse(md, None).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("version")));
        assert!(report.warnings.iter().any(|w| w.contains("license")));
        assert!(report.warnings.iter().any(|w| w.contains("tags")));
    }

    #[test]
    fn tier_ordering() {
        assert!(ActionTier::Read < ActionTier::ServiceMutation);
        assert!(ActionTier::DestructiveMutation < ActionTier::DataMutation);
        assert!(!ActionTier::Read.is_mutation());
        assert!(ActionTier::DataMutation.is_mutation());
    }
}
