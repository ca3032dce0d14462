//! Skills compiled into the binary.
//!
//! The bundled registry is the zero-dependency fallback: agents can always
//! reference `bundled` sources even when no configmap, git host, or registry
//! is reachable.  To add a bundled skill, drop a `SKILL.md` (and optional
//! `actions.yaml`) under `src/skills/bundled/<name>/` and register it below.

use std::collections::HashMap;

/// `(SKILL.md, Option<actions.yaml>)` content pairs keyed by skill name.
pub fn bundled_skills() -> HashMap<&'static str, (&'static str, Option<&'static str>)> {
    let mut skills = HashMap::new();
    skills.insert(
        "cluster-health",
        (
            include_str!("bundled/cluster-health/SKILL.md"),
            Some(include_str!("bundled/cluster-health/actions.yaml")),
        ),
    );
    skills
}
