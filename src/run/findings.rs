//! Findings extraction from the final report text.
//!
//! Severity is carried by a line prefix (`CRITICAL:`, `WARNING:`, `INFO:`)
//! or the equivalent sigils (🔴 / 🟡 / 🔵) that models tend to emit.

use super::record::{Finding, FindingSeverity};

const PREFIXES: &[(&str, FindingSeverity)] = &[
    ("CRITICAL:", FindingSeverity::Critical),
    ("🔴", FindingSeverity::Critical),
    ("WARNING:", FindingSeverity::Warning),
    ("🟡", FindingSeverity::Warning),
    ("INFO:", FindingSeverity::Info),
    ("🔵", FindingSeverity::Info),
];

/// Scan report text for severity-prefixed lines.
pub fn extract_findings(report: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for line in report.lines() {
        let trimmed = line.trim().trim_start_matches(['-', '*', ' ']);
        for (prefix, severity) in PREFIXES {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                let message = rest.trim().trim_start_matches(':').trim().to_string();
                if !message.is_empty() {
                    findings.push(Finding {
                        severity: *severity,
                        message,
                    });
                }
                break;
            }
        }
    }
    findings
}

// ─── Tests ───────────────────────────────────────────────────────────────────
