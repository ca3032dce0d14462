//! Resolved runtime environment: endpoints, namespaces, data resources,
//! MCP servers, and credential capabilities.
//!
//! Credentials are deliberately opaque — the environment carries only an
//! identifier and the capability describing where the credential applies.
//! Secret material never enters the assembler or the audit trail.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A named endpoint the agent may reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    /// Internal endpoints are annotated in the assembled prompt so the model
    /// does not suggest exposing them.
    #[serde(default)]
    pub internal: bool,
}

/// A logical grouping of Kubernetes namespaces (e.g. "prod", "staging").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceGroup {
    pub name: String,
    pub namespaces: Vec<String>,
}

/// A declared stateful resource the safety engine treats as protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResource {
    pub name: String,
    /// Resource kind (e.g. `PersistentVolumeClaim`, `CloudNativePGCluster`).
    pub kind: String,
    pub namespace: String,
}

/// An MCP server exposed to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    pub name: String,
    pub url: String,
}

/// Credential capability: an identifier plus the URL prefix it applies to.
/// The secret itself lives with the external credential provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRef {
    pub id: String,
    #[serde(default)]
    pub url_prefix: String,
}

/// Resolved runtime context an agent executes against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
    pub namespace_groups: Vec<NamespaceGroup>,
    pub data_resources: Vec<DataResource>,
    pub mcp_servers: Vec<McpServer>,
    pub credentials: Vec<CredentialRef>,
}

impl Environment {
    /// Build the index the safety engine consults for data-resource impact.
    pub fn data_resource_index(&self) -> DataResourceIndex {
        DataResourceIndex::new(&self.data_resources)
    }
}

// ─── DataResourceIndex ───────────────────────────────────────────────────────

/// Lookup structure over declared data resources, consulted on destructive
/// and data mutations.
#[derive(Debug, Clone, Default)]
pub struct DataResourceIndex {
    by_namespace: HashMap<String, Vec<String>>,
    names: HashSet<String>,
}

impl DataResourceIndex {
    pub fn new(resources: &[DataResource]) -> Self {
        let mut by_namespace: HashMap<String, Vec<String>> = HashMap::new();
        let mut names = HashSet::new();
        for r in resources {
            by_namespace
                .entry(r.namespace.to_lowercase())
                .or_default()
                .push(r.name.to_lowercase());
            names.insert(r.name.to_lowercase());
        }
        Self { by_namespace, names }
    }

    /// Whether the namespace contains any declared data resource.
    pub fn namespace_has_data(&self, namespace: &str) -> bool {
        self.by_namespace.contains_key(&namespace.to_lowercase())
    }

    /// Whether the target string names a declared data resource directly.
    /// Matching is case-insensitive substring — the target format varies by
    /// tool (`pvc/my-data -n prod`, a URL, a SQL statement).
    pub fn target_names_resource(&self, target: &str) -> Option<&str> {
        let lowered = target.to_lowercase();
        self.names
            .iter()
            .find(|name| lowered.contains(name.as_str()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
