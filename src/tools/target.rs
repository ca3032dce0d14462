//! Universal target extraction.
//!
//! Produces the informational `target` string the safety engine matches
//! allow/deny globs against and the audit trail records.  The target is
//! never a bypass: the engine's hardcoded protections inspect it, but tools
//! still receive the raw args.

use serde_json::Value;

/// Extract the target string from tool-call args.
///
/// - Kubernetes-style args → `"<resource>[ -n <namespace>][ <name>]"`
/// - HTTP-style args → the `url`
/// - MCP-style args → `"<server>/<tool>"`
/// - otherwise → compact stringification of the args
pub fn extract_target(args: &Value) -> String {
    let Some(map) = args.as_object() else {
        return fallback(args);
    };

    if let Some(resource) = str_field(map, "resource") {
        let mut target = resource.to_string();
        if let Some(ns) = str_field(map, "namespace") {
            target.push_str(&format!(" -n {ns}"));
        }
        if let Some(name) = str_field(map, "name") {
            target.push_str(&format!(" {name}"));
        }
        return target;
    }

    if let Some(url) = str_field(map, "url") {
        return url.to_string();
    }

    if let (Some(server), Some(tool)) = (str_field(map, "server"), str_field(map, "tool")) {
        return format!("{server}/{tool}");
    }

    // SSH/SQL tools carry the statement or command itself.
    if let Some(command) = str_field(map, "command") {
        return command.to_string();
    }
    if let Some(query) = str_field(map, "query") {
        return query.to_string();
    }

    fallback(args)
}

fn str_field<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn fallback(args: &Value) -> String {
    match args {
        Value::Null => String::new(),
        other => {
            let mut s = other.to_string();
            if s.len() > 256 {
                s.truncate(256);
            }
            s
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
