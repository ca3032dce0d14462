//! Glob matching for action patterns.
//!
//! Patterns use `*` as "any run of characters" with no separator
//! semantics — `kubectl.*` matches `kubectl.get`, `*delete*` matches
//! anywhere in a dotted tool name, and target patterns span spaces.
//! Matching is case-insensitive throughout the safety engine.

use globset::GlobBuilder;

/// Case-insensitive glob match of `text` against `pattern`.
///
/// Patterns that fail to compile (stray brackets from SQL fragments and the
/// like) fall back to literal case-insensitive comparison — a malformed
/// pattern must never widen a match.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    match GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(false)
        .backslash_escape(false)
        .build()
    {
        Ok(glob) => glob.compile_matcher().is_match(text),
        Err(_) => pattern.eq_ignore_ascii_case(text),
    }
}

/// Whether any pattern in `patterns` matches `text`.
pub fn any_match<'a, I>(patterns: I, text: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    patterns.into_iter().any(|p| glob_match(p, text))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
