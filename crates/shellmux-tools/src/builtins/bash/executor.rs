//! One-off command execution
//!
//! Every call spawns a fresh shell process, waits for it under a timeout and
//! always reaps it. Nothing is shared between calls.

use super::constants::DRAIN_AFTER_KILL_MS;
use super::output::{pump, CommandOutput, OutputBuffer};
use super::shell::ShellSpec;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Per-call options for [`CommandExecutor::execute`].
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Upper bound on run time
    pub timeout: Duration,
    /// Directory to run in (current directory if unset)
    pub working_dir: Option<PathBuf>,
}

impl ExecOptions {
    /// Options with a timeout and no working directory.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            working_dir: None,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Stateless runner for single commands.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: ShellSpec,
    max_output_bytes: usize,
}

impl CommandExecutor {
    /// Executor running commands through `shell`.
    #[must_use]
    pub fn new(shell: ShellSpec, max_output_bytes: usize) -> Self {
        Self {
            shell,
            max_output_bytes,
        }
    }

    /// Run `command` once and return its combined output and status.
    pub async fn execute(&self, command: &str, options: &ExecOptions) -> Result<CommandOutput> {
        let start = Instant::now();
        let control = self.shell.platform.process_control();

        let mut cmd = self.shell.one_shot_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        control.prepare(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            let target = options
                .working_dir
                .as_ref()
                .map(|d| format!(" in {}", d.display()))
                .unwrap_or_default();
            Error::Spawn(format!("{}{}: {}", self.shell.program.display(), target, e))
        })?;

        let (tx, mut rx) = mpsc::channel(64);
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, tx);
        } else {
            drop(tx);
        }

        debug!(
            shell = %self.shell,
            timeout_ms = options.timeout.as_millis() as u64,
            cwd = ?options.working_dir,
            "Executing one-off command"
        );

        // Pipes are drained to EOF; only the capped prefix is kept.
        let mut output = OutputBuffer::new(self.max_output_bytes);
        let run = async {
            while let Some(chunk) = rx.recv().await {
                output.push(&chunk);
            }
            child.wait().await
        };

        let finished = tokio::time::timeout(options.timeout, run).await;
        match finished {
            Ok(Ok(status)) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                let exit_code = status.code().unwrap_or(-1);
                debug!(exit_code, duration_ms, "One-off command finished");
                Ok(output.finish(exit_code, duration_ms))
            }
            Ok(Err(e)) => {
                if let Err(kill_err) = control.kill_tree(&mut child).await {
                    warn!(error = %kill_err, "Failed to kill process after wait error");
                }
                Err(Error::Execution(format!("failed to wait for process: {}", e)))
            }
            Err(_) => {
                warn!(
                    timeout_ms = options.timeout.as_millis() as u64,
                    "One-off command timed out, killing process tree"
                );
                if let Err(e) = control.kill_tree(&mut child).await {
                    warn!(error = %e, "Failed to kill timed out process");
                }
                // Let the pumps see EOF so their tasks end.
                let _ = tokio::time::timeout(Duration::from_millis(DRAIN_AFTER_KILL_MS), async {
                    while rx.recv().await.is_some() {}
                })
                .await;
                Err(Error::Timeout(options.timeout.as_millis() as u64))
            }
        }
    }
}
