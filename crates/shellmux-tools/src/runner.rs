//! Runner - Tool execution engine
//!
//! Dispatches tool invocations by name and keeps per-tool execution
//! statistics. Errors raised by a tool are folded into an error
//! [`ToolResult`] so callers always receive the `{content, isError}` shape.

use crate::error::{Error, Result};
use crate::registry::{ToolContext, ToolRegistry, ToolResult};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, instrument};

/// Aggregated execution statistics for one tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    /// Number of invocations
    pub total_executions: u64,
    /// Invocations that returned `is_error = false`
    pub successful_executions: u64,
    /// Invocations that returned `is_error = true`
    pub failed_executions: u64,
    /// Sum of invocation durations
    pub total_duration_ms: u64,
}

impl ToolStats {
    fn record(&mut self, result: &ToolResult) {
        self.total_executions += 1;
        if result.is_error {
            self.failed_executions += 1;
        } else {
            self.successful_executions += 1;
        }
        self.total_duration_ms += result.duration_ms;
    }

    /// Mean duration per invocation
    #[must_use]
    pub fn average_duration_ms(&self) -> u64 {
        self.total_duration_ms
            .checked_div(self.total_executions)
            .unwrap_or(0)
    }
}

/// Tool runner that dispatches by name
#[derive(Clone)]
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    stats: Arc<RwLock<HashMap<String, ToolStats>>>,
}

impl ToolRunner {
    /// Create a new tool runner
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the registry
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a tool by name
    ///
    /// Returns `Err` only when the tool cannot be dispatched at all
    /// (unknown or disabled). Everything else is reported in the result.
    #[instrument(skip(self, input, ctx), fields(tool = %tool_name))]
    pub async fn execute(
        &self,
        tool_name: &str,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| Error::NotFound(tool_name.to_string()))?;

        let enabled = self
            .registry
            .get_definition(tool_name)
            .is_some_and(|d| d.enabled);
        if !enabled {
            return Err(Error::PermissionDenied(format!(
                "Tool '{}' is disabled",
                tool_name
            )));
        }

        let start = Instant::now();
        let result = match tool.validate_input(&input) {
            Ok(()) => tool.execute(input, ctx).await,
            Err(e) => Err(e),
        };
        let result = result.unwrap_or_else(|e| {
            let duration = start.elapsed().as_millis() as u64;
            error!(tool = %tool_name, error = %e, "Tool execution failed");
            ToolResult::failure(e.to_string(), duration)
        });

        debug!(
            tool = %tool_name,
            is_error = %result.is_error,
            duration_ms = %result.duration_ms,
            "Tool execution completed"
        );

        self.stats
            .write()
            .await
            .entry(tool_name.to_string())
            .or_default()
            .record(&result);

        Ok(result)
    }

    /// Execution statistics for a tool, if it has run at least once
    pub async fn stats(&self, tool_name: &str) -> Option<ToolStats> {
        self.stats.read().await.get(tool_name).cloned()
    }
}
