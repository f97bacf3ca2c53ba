//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools let an agent act on the workspace: read and write files, run
//! allow-listed shell commands, search the tree.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::ToolError;

/// The result of a tool execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Diagnostic text when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Tool-specific structured details (exit code, match count, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Collapse into the `(ok, payload)` pair agents work with.
    pub fn into_pair(self) -> (bool, String) {
        if self.success {
            (true, self.output)
        } else {
            let payload = self.error.unwrap_or(self.output);
            (false, payload)
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "bash", "read_file").
    fn name(&self) -> &str;

    /// A one-line description of what this tool does.
    fn description(&self) -> &str;

    /// Whether this tool may run at all. Checked by the registry before `execute`.
    fn is_authorized(&self) -> bool {
        true
    }

    /// Execute the tool with the given JSON arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// A registry of available tools, looked up by name.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Execute a tool by name.
    ///
    /// Never returns an error: a missing tool, a refused tool and a failing
    /// tool all come back as a `ToolResult` with `success == false`.
    pub async fn execute(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::failure(ToolError::NotFound(name.to_string()).to_string());
        };
        if !tool.is_authorized() {
            return ToolResult::failure(ToolError::NotAuthorized(name.to_string()).to_string());
        }

        match tool.execute(arguments).await {
            Ok(result) => {
                debug!(tool = name, success = result.success, "Tool executed");
                result
            }
            Err(e) => {
                debug!(tool = name, error = %e, "Tool failed");
                ToolResult::failure(e.to_string())
            }
        }
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` for every tool, sorted by name.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.names()
            .into_iter()
            .filter_map(|n| self.get(n).map(|t| (n.to_string(), t.description().to_string())))
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
