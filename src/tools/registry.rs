//! Central registry of available tools.
//!
//! Populated once at wiring time and effectively read-only afterwards, so a
//! plain `Arc<ToolRegistry>` is sufficient for sharing across runs.

use std::{collections::HashMap, sync::Arc};

use futures::FutureExt;
use serde_json::Value;

use super::traits::{Tool, ToolDefinition};

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.  Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Names of all registered tools.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for inclusion in LLM requests, sorted by name for a
    /// stable prompt.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a named tool.  A panicking tool is caught at this boundary
    /// and surfaced as an ordinary failure so the run can continue.
    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("tool '{name}' is not registered"))?;
        match std::panic::AssertUnwindSafe(tool.execute(args))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => Err(format!("tool '{name}' panicked during execution")),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
