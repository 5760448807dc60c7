use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level error type for the toolbridge adapter layer.
///
/// The first five variants mirror the failure taxonomy every transport
/// reports; the rest cover registry bookkeeping and local I/O.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The transport could not be established (spawn failure, refused
    /// connection, bad URL) or was lost mid-call.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A call exceeded its deadline.
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The remote server sent a malformed or unexpected message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Arguments were rejected locally before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote server executed the tool and reported a failure.
    #[error("Remote tool error: {0}")]
    RemoteTool(String),

    /// The adapter's session has been closed or released.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// A tool name is already taken in the registry.
    #[error("Tool name collision: {0}")]
    Collision(String),

    /// No tool with the requested name is registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`BridgeError`].
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Serialisable tag identifying which part of the taxonomy a failure
/// belongs to. Carried inside failed invocation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`BridgeError::Connection`].
    Connection,
    /// See [`BridgeError::Timeout`].
    Timeout,
    /// See [`BridgeError::Protocol`].
    Protocol,
    /// See [`BridgeError::Validation`].
    Validation,
    /// See [`BridgeError::RemoteTool`].
    RemoteTool,
    /// See [`BridgeError::SessionClosed`].
    SessionClosed,
    /// Anything else (collision, config, local I/O).
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::RemoteTool => "RemoteToolError",
            ErrorKind::SessionClosed => "SessionClosedError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

impl BridgeError {
    /// The taxonomy tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Connection(_) => ErrorKind::Connection,
            BridgeError::Timeout(_) => ErrorKind::Timeout,
            BridgeError::Protocol(_) | BridgeError::Json(_) => ErrorKind::Protocol,
            BridgeError::Validation(_) | BridgeError::UnknownTool(_) => ErrorKind::Validation,
            BridgeError::RemoteTool(_) => ErrorKind::RemoteTool,
            BridgeError::SessionClosed(_) => ErrorKind::SessionClosed,
            BridgeError::Collision(_) | BridgeError::Config(_) | BridgeError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// The error description without the variant prefix.
    pub fn description(&self) -> String {
        match self {
            BridgeError::Connection(m)
            | BridgeError::Timeout(m)
            | BridgeError::Protocol(m)
            | BridgeError::Validation(m)
            | BridgeError::RemoteTool(m)
            | BridgeError::SessionClosed(m)
            | BridgeError::Collision(m)
            | BridgeError::UnknownTool(m)
            | BridgeError::Config(m) => m.clone(),
            BridgeError::Json(e) => e.to_string(),
            BridgeError::Io(e) => e.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(BridgeError::Timeout("t".into()).kind(), ErrorKind::Timeout);
        assert_eq!(
            BridgeError::Validation("v".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BridgeError::SessionClosed("gone".into()).kind(),
            ErrorKind::SessionClosed
        );
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(BridgeError::from(json_err).kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_display_and_description() {
        let err = BridgeError::RemoteTool("division by zero".into());
        assert_eq!(err.to_string(), "Remote tool error: division by zero");
        assert_eq!(err.description(), "division by zero");
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::RemoteTool).unwrap();
        assert_eq!(json, "\"remote_tool\"");
        assert_eq!(ErrorKind::Timeout.to_string(), "TimeoutError");
    }
}
