//! The tool capability contract.
//!
//! Concrete tool implementations (kubectl, HTTP, SSH, SQL, persistent state)
//! live with their integrations; the engine depends only on this contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::skills::ActionTier;

/// Domain a tool operates in; drives blast-radius mutation depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolDomain {
    Kubernetes,
    Http,
    Ssh,
    Sql,
    Mcp,
    /// Persistent per-agent state I/O.
    State,
    /// Identity/credential management surfaces.
    Identity,
    #[default]
    Other,
}

/// Static capability declaration for a classifiable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub domain: ToolDomain,
    pub supported_tiers: Vec<ActionTier>,
    #[serde(default)]
    pub requires_credentials: bool,
    #[serde(default)]
    pub requires_connection: bool,
}

/// Outcome of a tool's own pre-flight classification of a concrete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionClassification {
    pub tier: ActionTier,
    pub target: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub block_reason: String,
}

/// Summary of a registered tool, suitable for inclusion in LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the accepted parameters.
    pub parameters: Value,
}

/// A capability the conversation loop can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier, e.g. `"kubectl.get"`.
    fn name(&self) -> &str;

    /// Human-readable description used in LLM tool definitions.
    fn description(&self) -> &str;

    /// JSON Schema object describing the tool's accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool.  Cancellation arrives by dropping the future; the
    /// orchestrator owns the deadline.
    async fn execute(&self, args: Value) -> Result<String, String>;

    /// Static capability, when the tool participates in classification.
    fn capability(&self) -> Option<Capability> {
        None
    }

    /// Pure pre-flight classification of a concrete call.  Must not perform
    /// I/O.  The default leaves classification to the safety engine's
    /// heuristics.
    fn classify_action(&self, _args: &Value) -> Option<ActionClassification> {
        None
    }
}
