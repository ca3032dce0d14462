//! Data protection: the hardcoded rule set and configurable extensions.
//!
//! The hardcoded rules are non-configurable and fail-closed — no agent
//! policy, autonomy level, or approval mode can weaken them.  User-defined
//! protection classes may only extend the set: a class rule can block,
//! require approval, or mark for audit, never unprotect.

use serde::{Deserialize, Serialize};

use super::matching::glob_match;

// ─── Hardcoded protection ────────────────────────────────────────────────────

/// Resource-kind globs whose deletion is always blocked.  Tokens from the
/// target are matched case-insensitively against each entry.
const PROTECTED_KINDS: &[&str] = &[
    "pv",
    "pvc",
    "persistentvolume*",
    "namespace*",
    "ns",
    // Database and storage custom resources.
    "*postgresql*",
    "*cloudnativepg*",
    "*mysql*",
    "*mariadb*",
    "*mongodb*",
    "*cassandra*",
    "*redisfailover*",
    "*kafka*",
    "*etcdcluster*",
    "*miniotenant*",
    "*bucketclaim*",
];

/// SQL statements that destroy data, matched case-insensitively.
const DESTRUCTIVE_SQL: &[&str] = &["drop database", "drop table", "truncate", "delete from"];

/// Outcome of the hardcoded check: the reason a call is blocked, or `None`.
pub fn hardcoded_block_reason(tool: &str, target: &str) -> Option<String> {
    let tool_is_delete = glob_match("*delete*", tool);
    let tool_is_patch = glob_match("*patch*", tool);
    let target_lower = target.to_lowercase();

    // Deletion of a protected kind.
    if tool_is_delete {
        if let Some(kind) = mentioned_protected_kind(target) {
            return Some(format!("deletion of protected kind '{kind}'"));
        }
    }

    // Reclaim-policy patches that would enable deletion.
    if tool_is_patch
        && (target_lower.contains("persistentvolume") || target_token(target, "pv"))
        && target_lower.contains("reclaim")
    {
        return Some("reclaim-policy patch on a persistent volume".to_string());
    }

    // Object-storage delete URLs.
    if target_lower.starts_with("http://") || target_lower.starts_with("https://") {
        let is_object_store = target_lower.contains("s3") || target_lower.contains("minio");
        if is_object_store && (tool_is_delete || target_lower.contains("delete")) {
            return Some("object-storage delete URL".to_string());
        }
    }

    // MCP `<server>/<tool>` targets whose tool half deletes.
    if let Some((_, mcp_tool)) = target.split_once('/') {
        if !target_lower.starts_with("http") && glob_match("*.delete*", mcp_tool) {
            return Some(format!("MCP delete tool '{mcp_tool}'"));
        }
    }

    // Destructive SQL.
    for statement in DESTRUCTIVE_SQL {
        if target_lower.contains(statement) {
            return Some(format!("destructive SQL ('{statement}')"));
        }
    }

    None
}

/// The protected kind mentioned by the target, if any.  Tokens are the
/// whitespace- and slash-separated pieces of the target.
fn mentioned_protected_kind(target: &str) -> Option<&'static str> {
    for token in target.split(|c: char| c.is_whitespace() || c == '/') {
        if token.is_empty() {
            continue;
        }
        for kind in PROTECTED_KINDS {
            if glob_match(kind, token) {
                return Some(kind);
            }
        }
    }
    None
}

fn target_token(target: &str, token: &str) -> bool {
    target
        .split(|c: char| c.is_whitespace() || c == '/')
        .any(|t| t.eq_ignore_ascii_case(token))
}

// ─── Configurable protection classes ─────────────────────────────────────────

/// What a matching class rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionAction {
    Block,
    Approve,
    Audit,
}

/// One user-defined rule inside a protection class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionRule {
    /// Tool domain the rule applies to; empty matches any domain.
    #[serde(default)]
    pub domain: String,
    /// Glob over the extracted target.
    pub pattern: String,
    pub action: ProtectionAction,
}

/// A named set of protection rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionClass {
    pub name: String,
    pub rules: Vec<ProtectionRule>,
}

/// A matched rule, with enough context for audit.
#[derive(Debug, Clone)]
pub struct ProtectionMatch {
    pub class: String,
    pub action: ProtectionAction,
    pub pattern: String,
}

/// Evaluates user-defined protection classes.  Classes extend the hardcoded
/// set; they are consulted only after the hardcoded rules pass.
#[derive(Debug, Clone, Default)]
pub struct ProtectionEngine {
    classes: Vec<ProtectionClass>,
}

impl ProtectionEngine {
    pub fn new(classes: Vec<ProtectionClass>) -> Self {
        Self { classes }
    }

    /// First matching rule wins, in declaration order.  `Block` beats
    /// `Approve` beats `Audit` when multiple rules in the same class match
    /// the same target.
    pub fn evaluate(&self, domain: &str, target: &str) -> Option<ProtectionMatch> {
        let mut best: Option<ProtectionMatch> = None;
        for class in &self.classes {
            for rule in &class.rules {
                let domain_ok =
                    rule.domain.is_empty() || rule.domain.eq_ignore_ascii_case(domain);
                if !domain_ok || !glob_match(&rule.pattern, target) {
                    continue;
                }
                let candidate = ProtectionMatch {
                    class: class.name.clone(),
                    action: rule.action,
                    pattern: rule.pattern.clone(),
                };
                best = match best {
                    None => Some(candidate),
                    Some(prev) if severity(candidate.action) > severity(prev.action) => {
                        Some(candidate)
                    }
                    Some(prev) => Some(prev),
                };
            }
        }
        best
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn severity(action: ProtectionAction) -> u8 {
    match action {
        ProtectionAction::Audit => 0,
        ProtectionAction::Approve => 1,
        ProtectionAction::Block => 2,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
