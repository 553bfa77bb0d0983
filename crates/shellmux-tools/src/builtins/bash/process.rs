//! Platform process control
//!
//! Killing only the shell leaves its children running, so every child is
//! started as the leader of its own process tree and torn down as a unit.

use super::shell::Platform;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Spawn/terminate semantics for one platform family.
#[async_trait::async_trait]
pub trait ProcessControl: Send + Sync {
    /// Configure `cmd` before spawning so its tree can be signalled later.
    fn prepare(&self, cmd: &mut Command);

    /// Forcefully kill the whole tree rooted at `child` and reap it.
    async fn kill_tree(&self, child: &mut Child) -> std::io::Result<()>;

    /// Ask the tree to exit, force-kill after `grace`, and reap.
    async fn terminate(&self, child: &mut Child, grace: Duration) -> std::io::Result<()>;
}

impl Platform {
    /// Process control matching this platform.
    #[must_use]
    pub fn process_control(&self) -> &'static dyn ProcessControl {
        match self {
            Self::Posix => &PosixControl,
            Self::Windows => &WindowsControl,
        }
    }
}

/// Kill `child` unless it already exited, then wait for it.
async fn reap(child: &mut Child) -> std::io::Result<()> {
    match child.try_wait()? {
        Some(_) => Ok(()),
        None => child.kill().await,
    }
}

/// Process groups and `killpg`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixControl;

#[cfg(unix)]
impl PosixControl {
    fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        if let Some(pid) = pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
                debug!(pid, ?signal, error = %e, "killpg failed");
            }
        }
    }
}

#[async_trait::async_trait]
impl ProcessControl for PosixControl {
    fn prepare(&self, cmd: &mut Command) {
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);
    }

    #[cfg(unix)]
    async fn kill_tree(&self, child: &mut Child) -> std::io::Result<()> {
        Self::signal_group(child.id(), nix::sys::signal::Signal::SIGKILL);
        reap(child).await
    }

    #[cfg(not(unix))]
    async fn kill_tree(&self, child: &mut Child) -> std::io::Result<()> {
        reap(child).await
    }

    #[cfg(unix)]
    async fn terminate(&self, child: &mut Child, grace: Duration) -> std::io::Result<()> {
        use nix::sys::signal::Signal;

        let pid = child.id();
        if child.try_wait()?.is_some() {
            // Leader is gone; stragglers in the group still get killed.
            Self::signal_group(pid, Signal::SIGKILL);
            return Ok(());
        }

        Self::signal_group(pid, Signal::SIGTERM);
        tokio::select! {
            status = child.wait() => status.map(|_| ()),
            _ = tokio::time::sleep(grace) => {
                warn!(pid = ?child.id(), "Process ignored SIGTERM, killing");
                self.kill_tree(child).await
            }
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&self, child: &mut Child, _grace: Duration) -> std::io::Result<()> {
        reap(child).await
    }
}

/// `taskkill /T` over the process id.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsControl;

impl WindowsControl {
    async fn taskkill(child: &Child, force: bool) {
        let Some(pid) = child.id() else {
            return;
        };
        let mut cmd = Command::new("taskkill");
        cmd.args(["/T", "/PID", &pid.to_string()]);
        if force {
            cmd.arg("/F");
        }
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        if let Err(e) = cmd.status().await {
            debug!(pid, error = %e, "taskkill failed");
        }
    }
}

#[async_trait::async_trait]
impl ProcessControl for WindowsControl {
    fn prepare(&self, cmd: &mut Command) {
        cmd.kill_on_drop(true);
    }

    async fn kill_tree(&self, child: &mut Child) -> std::io::Result<()> {
        Self::taskkill(child, true).await;
        reap(child).await
    }

    async fn terminate(&self, child: &mut Child, grace: Duration) -> std::io::Result<()> {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        Self::taskkill(child, false).await;
        tokio::select! {
            status = child.wait() => status.map(|_| ()),
            _ = tokio::time::sleep(grace) => self.kill_tree(child).await,
        }
    }
}
