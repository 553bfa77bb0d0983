//! shellmux-tools - Shell execution tools
//!
//! This crate provides:
//! - Registry: Tool registration and discovery
//! - Runner: Dispatch by name with execution statistics
//! - Builtins: the `bash` tool with one-off and persistent sessions

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod registry;
pub mod runner;

pub use builtins::bash::{
    resolve_default_shell, resolve_shell, BashConfig, BashRequest, BashTool, CommandExecutor,
    CommandOutput, ExecOptions, Platform, Session, SessionManager, ShellKind, ShellSpec,
};
pub use builtins::register_builtins;
pub use error::{Error, Result};
pub use registry::{Tool, ToolCategory, ToolContext, ToolDefinition, ToolRegistry, ToolResult};
pub use runner::{ToolRunner, ToolStats};
