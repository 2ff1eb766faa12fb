use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three failure classes a caller can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The remote service implementation itself failed. Never retried.
    Business,
    /// The call could not be delivered or dispatched (no provider, bad frame, config).
    Framework,
    /// Connection inactive, send failure or timeout.
    Transport,
}

/// Error type shared by every layer of the engine.
///
/// Errors travel inside [`Response`](super::Response) as-is, so the variant a
/// provider produced is the variant the caller observes.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum RpcError {
    #[error("Business error: {0}")]
    Business(String),

    #[error("Framework error: {0}")]
    Framework(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Service not available: {0}")]
    ServiceUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Business(_) => ErrorKind::Business,
            RpcError::Transport(_) | RpcError::Timeout(_) | RpcError::Connection(_) => {
                ErrorKind::Transport
            }
            RpcError::Framework(_)
            | RpcError::ServiceUnavailable(_)
            | RpcError::Serialization(_)
            | RpcError::InvalidUrl(_)
            | RpcError::Config(_) => ErrorKind::Framework,
        }
    }

    pub fn is_business(&self) -> bool {
        self.kind() == ErrorKind::Business
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
