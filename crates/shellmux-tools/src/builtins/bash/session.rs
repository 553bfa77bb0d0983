//! Persistent shell sessions
//!
//! A [`Session`] owns one long-lived shell process. Commands are written to
//! its stdin wrapped in a [`Sentinel`]; stdout and stderr are pumped into a
//! single channel and buffered until the sentinel line shows up. The I/O
//! half lives behind an async mutex, which is what serializes commands: a
//! second `run` waits for the first to finish before it writes anything.

use super::config::BashConfig;
use super::output::{pump, CommandOutput};
use super::process::ProcessControl;
use super::sentinel::{FrameScanner, Sentinel};
use super::shell::ShellSpec;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// The exclusively owned process half of a session.
struct ShellIo {
    child: Child,
    stdin: ChildStdin,
    output: mpsc::Receiver<Vec<u8>>,
}

enum Outcome {
    Completed(i32),
    ShellExited,
}

impl ShellIo {
    /// Drop output that arrived after the previous marker.
    fn discard_stale(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(chunk) = self.output.try_recv() {
            dropped += chunk.len();
        }
        dropped
    }

    async fn read_until(&mut self, scanner: &mut FrameScanner) -> Outcome {
        loop {
            match self.output.recv().await {
                Some(chunk) => {
                    if let Some(code) = scanner.feed(&chunk) {
                        return Outcome::Completed(code);
                    }
                }
                None => return Outcome::ShellExited,
            }
        }
    }
}

/// One live shell bound to a caller-chosen id.
pub struct Session {
    id: String,
    shell: ShellSpec,
    control: &'static dyn ProcessControl,
    config: BashConfig,
    active: AtomicBool,
    created_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    commands: AtomicU64,
    closed: CancellationToken,
    io: Mutex<Option<ShellIo>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("shell", &self.shell)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Session {
    /// Spawn `shell` as a long-lived child with piped stdio.
    pub fn start(id: impl Into<String>, shell: ShellSpec, config: BashConfig) -> Result<Self> {
        let id = id.into();
        let control = shell.platform.process_control();

        let mut cmd = shell.session_command();
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        control.prepare(&mut cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", shell.program.display(), e)))?;

        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => {
                let _ = child.start_kill();
                return Err(Error::Spawn("shell stdio was not captured".to_string()));
            }
        };

        let (tx, rx) = mpsc::channel(64);
        pump(stdout, tx.clone());
        pump(stderr, tx);

        let now = Utc::now();
        info!(session_id = %id, shell = %shell, pid = ?child.id(), "Started shell session");

        Ok(Self {
            id,
            shell,
            control,
            config,
            active: AtomicBool::new(true),
            created_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            commands: AtomicU64::new(0),
            closed: CancellationToken::new(),
            io: Mutex::new(Some(ShellIo {
                child,
                stdin,
                output: rx,
            })),
        })
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shell this session runs.
    #[must_use]
    pub fn shell(&self) -> &ShellSpec {
        &self.shell
    }

    /// Whether the shell is still usable.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// When the session was started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the last command was submitted.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }

    /// Number of commands submitted so far.
    #[must_use]
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    fn closed_error(&self) -> Error {
        Error::SessionClosed(self.id.clone())
    }

    /// Run `command` and wait for completion, shell exit, or `timeout`.
    ///
    /// On timeout the whole process tree is killed and the session becomes
    /// inactive. A non-zero exit is a normal [`CommandOutput`], not an error.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        if !self.is_active() {
            return Err(self.closed_error());
        }

        let mut guard = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(self.closed_error()),
            guard = self.io.lock() => guard,
        };
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }
        let Some(io) = guard.as_mut() else {
            return Err(self.closed_error());
        };

        self.touch();
        let start = Instant::now();
        let sentinel = Sentinel::new();
        let mut scanner = FrameScanner::new(&sentinel, self.config.max_output_bytes);

        let stale = io.discard_stale();
        if stale > 0 {
            trace!(session_id = %self.id, bytes = stale, "Discarding stale output");
        }

        let script = sentinel.wrap(self.shell.kind, command);
        let written = async {
            io.stdin.write_all(script.as_bytes()).await?;
            io.stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            // The shell went away underneath us.
            warn!(session_id = %self.id, error = %e, "Failed to write to shell");
            let exit_code = self.retire(&mut guard).await;
            return Err(Error::Execution(format!(
                "shell for session '{}' is gone (exit {}): {}",
                self.id,
                exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                e
            )));
        }

        debug!(session_id = %self.id, timeout_ms = timeout.as_millis() as u64, "Running command");

        let outcome = tokio::select! {
            res = tokio::time::timeout(timeout, io.read_until(&mut scanner)) => res,
            _ = self.closed.cancelled() => {
                debug!(session_id = %self.id, "Command cancelled by close");
                return Err(self.closed_error());
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Outcome::Completed(exit_code)) => {
                debug!(session_id = %self.id, exit_code, duration_ms, "Command completed");
                Ok(scanner.finish(exit_code, duration_ms))
            }
            Ok(Outcome::ShellExited) => {
                let exit_code = self.retire(&mut guard).await.unwrap_or(-1);
                info!(session_id = %self.id, exit_code, "Shell exited during command");
                Ok(scanner.finish(exit_code, duration_ms))
            }
            Err(_) => {
                warn!(
                    session_id = %self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Command timed out, killing session"
                );
                self.active.store(false, Ordering::SeqCst);
                if let Some(mut io) = guard.take() {
                    if let Err(e) = self.control.kill_tree(&mut io.child).await {
                        warn!(session_id = %self.id, error = %e, "Failed to kill shell");
                    }
                }
                Err(Error::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Mark inactive, reap the exited shell, and return its status.
    async fn retire(&self, guard: &mut Option<ShellIo>) -> Option<i32> {
        self.active.store(false, Ordering::SeqCst);
        let mut io = guard.take()?;
        drop(io.stdin);
        match io.child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Failed to reap shell");
                None
            }
        }
    }

    /// Terminate the shell and mark the session inactive.
    ///
    /// Safe to call any number of times. A command in flight resolves with
    /// [`Error::SessionClosed`].
    pub async fn close(&self) {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        self.closed.cancel();

        let taken = self.io.lock().await.take();
        if let Some(ShellIo {
            mut child, stdin, ..
        }) = taken
        {
            // EOF on stdin lets a well-behaved shell exit by itself.
            drop(stdin);
            if let Err(e) = self
                .control
                .terminate(&mut child, self.config.close_grace())
                .await
            {
                warn!(session_id = %self.id, error = %e, "Failed to terminate shell");
            }
        }

        if was_active {
            info!(session_id = %self.id, commands = self.command_count(), "Closed shell session");
        }
    }
}
