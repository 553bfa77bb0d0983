//! Shell selection
//!
//! [`resolve_shell`] decides which shell binary to run for a platform and
//! environment. It never touches the process environment directly: callers
//! inject a [`ShellEnv`], so the rules are testable with a simulated host.
//!
//! Windows quirk: the generic `ComSpec` variable is ignored and PowerShell is
//! used unless the dedicated `SHELLMUX_SHELL` override is set. The observed
//! behaviour is kept as-is and pinned by tests.

use super::constants::*;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Host platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Windows-class hosts
    Windows,
    /// Unix-like hosts
    Posix,
}

impl Platform {
    /// Platform this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Posix => "posix",
        }
    }
}

/// Shell dialect, which decides argument syntax and the sentinel form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellKind {
    /// Bourne-compatible (`sh`, `bash`, `zsh`, ...)
    Posix,
    /// `powershell` / `pwsh`
    PowerShell,
    /// `cmd.exe`
    Cmd,
}

impl ShellKind {
    /// Classify a shell program by its file stem.
    #[must_use]
    pub fn from_program(program: &Path) -> Self {
        let stem = program
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match stem.as_str() {
            "powershell" | "pwsh" => Self::PowerShell,
            "cmd" => Self::Cmd,
            _ => Self::Posix,
        }
    }

    /// Command that changes the shell's working directory to `dir`.
    #[must_use]
    pub fn change_dir_command(&self, dir: &Path) -> String {
        let dir = dir.to_string_lossy();
        match self {
            Self::Posix => format!("cd '{}'", dir.replace('\'', "'\\''")),
            Self::PowerShell => format!("Set-Location -LiteralPath '{}'", dir.replace('\'', "''")),
            Self::Cmd => format!("cd /d \"{}\"", dir),
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::PowerShell => "powershell",
            Self::Cmd => "cmd",
        }
    }
}

const POWERSHELL_FLAGS: &[&str] = &["-NoLogo", "-NoProfile", "-NonInteractive"];

/// A resolved shell: what to spawn and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    /// Program path or name
    pub program: PathBuf,
    /// Dialect of the program
    pub kind: ShellKind,
    /// Platform the shell was resolved for
    pub platform: Platform,
}

impl ShellSpec {
    /// Build a spec, deriving the dialect from the program name.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, platform: Platform) -> Self {
        let program = program.into();
        let kind = ShellKind::from_program(&program);
        Self {
            program,
            kind,
            platform,
        }
    }

    /// Command for a long-lived shell that reads commands from stdin.
    #[must_use]
    pub fn session_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ShellKind::Posix => {}
            ShellKind::PowerShell => {
                cmd.args(POWERSHELL_FLAGS).args(["-Command", "-"]);
            }
            ShellKind::Cmd => {
                cmd.args(["/D", "/Q"]);
            }
        }
        cmd
    }

    /// Command that runs exactly one command string and exits.
    #[must_use]
    pub fn one_shot_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ShellKind::Posix => {
                cmd.arg("-c").arg(command);
            }
            ShellKind::PowerShell => {
                cmd.args(POWERSHELL_FLAGS).arg("-Command").arg(command);
            }
            ShellKind::Cmd => {
                cmd.args(["/D", "/S", "/C"]).arg(command);
            }
        }
        cmd
    }
}

impl std::fmt::Display for ShellSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.program.display(), self.kind.as_str())
    }
}

/// Environment inputs consumed by [`resolve_shell`].
pub trait ShellEnv {
    /// Read an environment variable.
    fn var(&self, key: &str) -> Option<String>;

    /// Whether `path` names an executable file.
    fn is_executable(&self, path: &Path) -> bool;
}

/// The real process environment and filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl ShellEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    #[cfg(unix)]
    fn is_executable(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_executable(&self, path: &Path) -> bool {
        std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }
}

/// Shells that understand the `{ ...; }` grouping the sentinel relies on.
const BOURNE_SHELLS: &[&str] = &["sh", "bash", "zsh", "dash", "ksh", "mksh", "ash", "yash"];

fn is_bourne_compatible(program: &Path) -> bool {
    program
        .file_name()
        .map(|n| {
            let name = n.to_string_lossy();
            BOURNE_SHELLS.iter().any(|s| name == *s)
        })
        .unwrap_or(false)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Pick the shell for `platform` given `env`.
#[must_use]
pub fn resolve_shell(platform: Platform, env: &dyn ShellEnv) -> ShellSpec {
    let dedicated = non_empty(env.var(SHELL_OVERRIDE_VAR));

    match platform {
        Platform::Windows => {
            // ComSpec does not participate.
            let program = dedicated.unwrap_or_else(|| WINDOWS_DEFAULT_SHELL.to_string());
            ShellSpec::new(program, platform)
        }
        Platform::Posix => {
            let program = dedicated
                .into_iter()
                .chain(non_empty(env.var(POSIX_SHELL_VAR)))
                .find(|candidate| {
                    let path = Path::new(candidate);
                    is_bourne_compatible(path) && env.is_executable(path)
                })
                .unwrap_or_else(|| POSIX_FALLBACK_SHELL.to_string());
            ShellSpec::new(program, platform)
        }
    }
}

/// Resolve against the running host.
#[must_use]
pub fn resolve_default_shell() -> ShellSpec {
    resolve_shell(Platform::current(), &SystemEnv)
}
