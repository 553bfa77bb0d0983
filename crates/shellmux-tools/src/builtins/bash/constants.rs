//! Constants for the bash tool

// ── Time/Size Constants ────────────────────────────────────────────────────

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MAX_TIMEOUT_MS: u64 = 600_000;
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024; // 1 MB
pub const CLOSE_GRACE_MS: u64 = 2_000;
pub const DEFAULT_SESSION_ID: &str = "default";

/// Chunk size for draining child pipes.
pub const READ_CHUNK_BYTES: usize = 8192;

/// Bounded wait for pipe readers after a process tree is killed.
pub const DRAIN_AFTER_KILL_MS: u64 = 500;

// ── Shell Selection ────────────────────────────────────────────────────────

/// Dedicated override honoured on every platform.
pub const SHELL_OVERRIDE_VAR: &str = "SHELLMUX_SHELL";

/// Login shell variable consulted on POSIX platforms.
pub const POSIX_SHELL_VAR: &str = "SHELL";

pub const POSIX_FALLBACK_SHELL: &str = "/bin/sh";
pub const WINDOWS_DEFAULT_SHELL: &str = "powershell.exe";

// ── Output Rendering ───────────────────────────────────────────────────────

pub const EXIT_CODE_LABEL: &str = "Exit Code:";
pub const TRUNCATION_NOTICE: &str = "[output truncated]";
