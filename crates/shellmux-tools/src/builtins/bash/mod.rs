//! Bash tool - one-off and persistent shell execution
//!
//! One-off calls spawn a fresh shell per command. Persistent calls run inside
//! a long-lived shell owned by a [`Session`], so `export` and `cd` carry over
//! between calls with the same session id.
//!
//! ```text
//! BashTool ──► CommandExecutor            (fresh process per call)
//!          └─► SessionManager ─► Session  (one shell per id, sentinel-framed)
//!                    ShellResolver picks the shell for both paths
//! ```

mod config;
mod constants;
mod executor;
mod manager;
mod output;
mod process;
mod sentinel;
mod session;
mod shell;
mod tool;

#[cfg(test)]
mod tests;

// Re-export public API
pub use config::BashConfig;
pub use executor::{CommandExecutor, ExecOptions};
pub use manager::SessionManager;
pub use output::CommandOutput;
pub use process::{PosixControl, ProcessControl, WindowsControl};
pub use sentinel::Sentinel;
pub use session::Session;
pub use shell::{
    resolve_default_shell, resolve_shell, Platform, ShellEnv, ShellKind, ShellSpec, SystemEnv,
};
pub use tool::{BashRequest, BashTool, BASH_TOOL_NAME};
