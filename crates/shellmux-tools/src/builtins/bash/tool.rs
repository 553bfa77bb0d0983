//! BashTool - validated entry point for shell execution
//!
//! Turns an untyped argument bag into a [`BashRequest`], routes it either to
//! a one-off [`CommandExecutor`] run or to a persistent [`Session`] from the
//! shared [`SessionManager`], and renders every outcome, failures included,
//! as a `{content, isError}` [`ToolResult`].
//!
//! [`Session`]: super::session::Session

use super::config::BashConfig;
use super::executor::{CommandExecutor, ExecOptions};
use super::manager::SessionManager;
use super::output::CommandOutput;
use crate::error::{Error, Result};
use crate::registry::{Tool, ToolCategory, ToolContext, ToolDefinition, ToolResult};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name under which the tool is registered.
pub const BASH_TOOL_NAME: &str = "bash";

/// A validated command request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BashRequest {
    /// Command text
    pub command: String,
    /// Requested timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Working directory to run in
    pub working_dir: Option<PathBuf>,
    /// Run inside a persistent session
    pub persistent: bool,
    /// Explicit session id
    pub session_id: Option<String>,
}

/// JavaScript-style truthiness, so `"persistent": 1` behaves like `true`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn optional_string(input: &Value, field: &str) -> Result<Option<String>> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidInput(format!("'{}' must be a string", field))),
    }
}

impl BashRequest {
    /// Validate raw tool input.
    pub fn from_value(input: &Value) -> Result<Self> {
        let command = match input.get("command") {
            None | Some(Value::Null) => {
                return Err(Error::InvalidInput("Command is required".to_string()));
            }
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(Error::InvalidInput(
                    "Command must be a string".to_string(),
                ));
            }
        };

        let timeout_ms = match input.get("timeout") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| {
                Error::InvalidInput("'timeout' must be a non-negative integer".to_string())
            })?),
        };

        Ok(Self {
            command,
            timeout_ms,
            working_dir: optional_string(input, "workingDir")?.map(PathBuf::from),
            persistent: input.get("persistent").is_some_and(is_truthy),
            session_id: optional_string(input, "sessionId")?,
        })
    }
}

/// Shell command tool with one-off and persistent modes.
pub struct BashTool {
    definition: ToolDefinition,
    config: BashConfig,
    executor: CommandExecutor,
    sessions: Arc<SessionManager>,
}

impl BashTool {
    /// Tool backed by `sessions`. Limits and the shell come from the
    /// registry, so one-off and persistent runs share them.
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        let config = sessions.config().clone();
        let definition = ToolDefinition::new(
            BASH_TOOL_NAME,
            "Execute bash commands in the system shell. Runs each command in a fresh \
             process by default; set persistent=true to run inside a long-lived session \
             that keeps environment variables and the working directory between calls.",
        )
        .with_category(ToolCategory::System)
        .with_internal(true)
        .with_agent_access(true)
        .with_parameters(serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": format!(
                        "Timeout in milliseconds (default {}, max {})",
                        config.default_timeout_ms, config.max_timeout_ms
                    )
                },
                "workingDir": {
                    "type": "string",
                    "description": "Working directory for the command"
                },
                "persistent": {
                    "type": "boolean",
                    "description": "Run in a persistent shell session (default false)"
                },
                "sessionId": {
                    "type": "string",
                    "description": "Persistent session to use; defaults to the caller's session"
                }
            },
            "required": ["command"]
        }));

        let executor = CommandExecutor::new(sessions.shell().clone(), config.max_output_bytes);

        Self {
            definition,
            config,
            executor,
            sessions,
        }
    }

    /// Shared session registry.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Validate, route, and render. Never fails; errors come back as
    /// `is_error` results.
    pub async fn handle(&self, input: &Value, ctx: &ToolContext) -> ToolResult {
        let start = Instant::now();
        let outcome = match BashRequest::from_value(input) {
            Ok(request) => self.dispatch(&request, ctx).await,
            Err(e) => Err(e),
        };
        let duration = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                let content = output.render();
                if output.success() {
                    ToolResult::success(content, duration)
                } else {
                    ToolResult::failure(content, duration)
                }
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!(error = %e, "Bash command timed out");
                } else {
                    debug!(error = %e, "Bash command failed");
                }
                ToolResult::failure(format!("Error: {}", e), duration)
            }
        }
    }

    async fn dispatch(&self, request: &BashRequest, ctx: &ToolContext) -> Result<CommandOutput> {
        let timeout = self.config.effective_timeout(request.timeout_ms);

        if !request.persistent {
            let mut options = ExecOptions::with_timeout(timeout);
            options.working_dir = request.working_dir.clone();
            return self.executor.execute(&request.command, &options).await;
        }

        let session_id = request
            .session_id
            .as_deref()
            .or(ctx.session_id.as_deref())
            .unwrap_or(&self.config.default_session_id);

        let session = self.sessions.get_session(session_id).await?;
        let deadline = Instant::now() + timeout;

        // The directory change sticks, exactly as if the caller had typed it.
        if let Some(dir) = &request.working_dir {
            let cd = session.shell().kind.change_dir_command(dir);
            let moved = session
                .run(&cd, timeout)
                .await
                .map_err(|e| whole_timeout(e, timeout))?;
            if !moved.success() {
                info!(session_id = %session_id, dir = %dir.display(), "Session could not enter workingDir");
                return Ok(moved);
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        session
            .run(&request.command, remaining)
            .await
            .map_err(|e| whole_timeout(e, timeout))
    }
}

/// Report timeouts against the caller's full budget.
fn whole_timeout(err: Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout(timeout.as_millis() as u64)
    } else {
        err
    }
}

#[async_trait::async_trait]
impl Tool for BashTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult> {
        Ok(self.handle(&input, ctx).await)
    }

    fn validate_input(&self, _input: &Value) -> Result<()> {
        // Shape errors are reported by `handle` with field-specific messages.
        Ok(())
    }
}
