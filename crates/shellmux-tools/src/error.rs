//! Error types for shellmux-tools

use thiserror::Error;

/// Tool error type
#[derive(Debug, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Process ran but could not be driven to completion
    #[error("execution failed: {0}")]
    Execution(String),

    /// The OS refused to create the process
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Permission denied
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Timeout
    #[error("command timeout after {0}ms")]
    Timeout(u64),

    /// Session was closed while (or before) a command ran
    #[error("session '{0}' is closed")]
    SessionClosed(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
