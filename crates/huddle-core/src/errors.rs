use thiserror::Error;

use crate::session::SessionId;

/// Errors returned synchronously across the host command boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("session {0} is not connected")]
    NotConnected(SessionId),
}

/// Failures reported by a session provider when an operation cannot even be
/// initiated. Never surfaced to the host as an error, only as an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("signal failed: {0}")]
    Signal(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
