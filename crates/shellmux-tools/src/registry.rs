//! Registry - Tool registration and discovery
//!
//! Tools are registered with metadata and can be queried by name,
//! category, or agent accessibility. The registry owns no execution
//! state; see [`crate::runner::ToolRunner`] for dispatch.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Tool category for organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// System-level capabilities (process execution, shells)
    System,
    /// File operations
    File,
    /// Utility operations
    Utility,
}

impl ToolCategory {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::File => "file",
            Self::Utility => "utility",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tool metadata and schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema for parameters
    pub parameters: serde_json::Value,
    /// Tool category
    pub category: ToolCategory,
    /// Only reachable through internal dispatch paths
    pub internal: bool,
    /// Whether an agent may invoke the tool
    pub agent_accessible: bool,
    /// Whether the tool is enabled
    pub enabled: bool,
}

impl ToolDefinition {
    /// Create a new tool definition
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            category: ToolCategory::Utility,
            internal: false,
            agent_accessible: false,
            enabled: true,
        }
    }

    /// Set the parameters schema
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the category
    #[must_use]
    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    /// Mark the tool as internal-only
    #[must_use]
    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// Mark the tool as callable by agents
    #[must_use]
    pub fn with_agent_access(mut self, accessible: bool) -> Self {
        self.agent_accessible = accessible;
        self
    }

    /// Set enabled status
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Ambient information about who is calling a tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolContext {
    /// Caller's conversation/session identifier
    pub session_id: Option<String>,
    /// Caller's user identifier
    pub user_id: Option<String>,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolContext {
    /// Context bound to a session id
    #[must_use]
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    /// Set the user id
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text rendered for the caller
    pub content: String,
    /// Whether the invocation failed
    #[serde(rename = "isError")]
    pub is_error: bool,
    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create a successful result
    #[must_use]
    pub fn success(content: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            duration_ms,
        }
    }

    /// Create a failed result
    #[must_use]
    pub fn failure(content: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            duration_ms,
        }
    }
}

/// Trait for tool implementations
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition
    fn definition(&self) -> &ToolDefinition;

    /// Execute the tool with given input
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult>;

    /// Validate input before execution
    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        if !input.is_object() {
            return Err(Error::InvalidInput("Input must be an object".to_string()));
        }
        Ok(())
    }
}

/// Registry for managing tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    definitions: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let def = tool.definition();
        let name = def.name.clone();
        debug!(tool = %name, category = %def.category, "Registering tool");
        self.definitions.insert(name.clone(), def.clone());
        self.tools.insert(name, tool);
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get a tool definition by name
    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    /// Check if a tool exists
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// List tools by category
    #[must_use]
    pub fn list_by_category(&self, category: ToolCategory) -> Vec<&ToolDefinition> {
        self.definitions
            .values()
            .filter(|d| d.category == category)
            .collect()
    }

    /// List enabled tools an agent may call
    #[must_use]
    pub fn list_agent_accessible(&self) -> Vec<&ToolDefinition> {
        self.definitions
            .values()
            .filter(|d| d.enabled && d.agent_accessible)
            .collect()
    }

    /// Enable a tool
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a tool
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.definitions.get_mut(name) {
            Some(def) => {
                def.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Get tool count
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
