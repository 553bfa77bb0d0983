//! Bash tool configuration types

use super::constants::*;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the bash tool and its session registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BashConfig {
    /// Timeout applied when a request does not carry one.
    pub default_timeout_ms: u64,
    /// Upper bound for requested timeouts.
    pub max_timeout_ms: u64,
    /// Maximum output kept per command, in bytes.
    pub max_output_bytes: usize,
    /// Grace period between SIGTERM and SIGKILL when closing a session.
    pub close_grace_ms: u64,
    /// Session used for persistent calls without any session identifier.
    pub default_session_id: String,
}

impl Default for BashConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_timeout_ms: MAX_TIMEOUT_MS,
            max_output_bytes: MAX_OUTPUT_BYTES,
            close_grace_ms: CLOSE_GRACE_MS,
            default_session_id: DEFAULT_SESSION_ID.to_string(),
        }
    }
}

impl BashConfig {
    /// Resolve a requested timeout against the default and the cap.
    #[must_use]
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Grace period as a `Duration`.
    #[must_use]
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}
