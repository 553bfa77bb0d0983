//! Builtins - Built-in tools for shellmux
//!
//! - Bash tool: `bash` (one-off and persistent shell execution)

pub mod bash;

pub use bash::{BashConfig, BashTool, SessionManager};

use crate::registry::ToolRegistry;
use std::sync::Arc;

/// Register all built-in tools, sharing `sessions` with the caller.
pub fn register_builtins(registry: &mut ToolRegistry, sessions: Arc<SessionManager>) {
    registry.register(Arc::new(BashTool::new(sessions)));
}
