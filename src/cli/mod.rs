//! CLI module for Shellmux
//!
//! Provides commands:
//! - `run`: Execute one command through the bash tool
//! - `shell`: Line-oriented loop over a persistent session
//! - `which-shell`: Print the resolved shell

use clap::{Parser, Subcommand};
use shellmux_tools::{register_builtins, SessionManager, ToolRegistry, ToolRunner};
use std::path::PathBuf;
use std::sync::Arc;

pub mod run;
pub mod shell;

/// Shellmux CLI
#[derive(Parser, Debug)]
#[command(name = "shellmux")]
#[command(about = "Shell command execution with persistent sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a single command
    Run {
        /// Command text, passed to the shell as-is
        command: String,
        /// Timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Working directory
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Run inside a persistent session
        #[arg(long)]
        persistent: bool,
        /// Session to run in, used with --persistent
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Read commands from stdin and run them in one persistent session
    Shell {
        /// Session id
        #[arg(long, default_value = "cli")]
        session_id: String,
        /// Per-command timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the shell that would be used
    WhichShell,
}

/// Registry, runner, and the session manager they share.
pub struct Toolkit {
    pub runner: ToolRunner,
    pub sessions: Arc<SessionManager>,
}

impl Toolkit {
    fn load() -> anyhow::Result<Self> {
        let config = crate::config::load_config()?;
        let sessions = Arc::new(SessionManager::from_env(config.bash));

        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry, Arc::clone(&sessions));

        Ok(Self {
            runner: ToolRunner::new(Arc::new(registry)),
            sessions,
        })
    }
}

/// Run the CLI command, returning the process exit code
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Some(Commands::Run {
            command,
            timeout,
            cwd,
            persistent,
            session_id,
        }) => {
            let toolkit = Toolkit::load()?;
            run::run(
                &toolkit,
                run::RunArgs {
                    command,
                    timeout,
                    cwd,
                    persistent,
                    session_id,
                },
            )
            .await
        }
        Some(Commands::Shell {
            session_id,
            timeout,
        }) => {
            let toolkit = Toolkit::load()?;
            shell::run(&toolkit, &session_id, timeout).await
        }
        Some(Commands::WhichShell) => {
            let shell = shellmux_tools::resolve_default_shell();
            println!("{}", shell);
            Ok(0)
        }
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(0)
        }
    }
}
