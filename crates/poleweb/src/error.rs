//! Error types for routing and dispatch.

use thiserror::Error;

use crate::binding::BindError;

/// Router-specific errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A pattern collides with one already registered.
    #[error("route conflict: {method} {pattern}: {reason}")]
    RouteConflict {
        method: String,
        pattern: String,
        reason: String,
    },

    /// Invalid path pattern.
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// No route matched the request.
    #[error("no route matched: {method} {uri}")]
    NotFound { method: String, uri: String },

    /// The path matched, but not for this method.
    #[error("method not allowed: {method} for {uri}")]
    MethodNotAllowed { method: String, uri: String },

    /// A handler or middleware gave up on the request.
    #[error("handler fault: {0}")]
    Fault(String),

    /// Request body could not be bound.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Template lookup or rendering failed.
    #[error("template error: {0}")]
    Template(String),

    /// JSON serialization of a response failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error while serving a file or the connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Builds a [`RouterError::Fault`] from any displayable cause.
    pub fn fault(cause: impl std::fmt::Display) -> Self {
        Self::Fault(cause.to_string())
    }

    pub(crate) fn conflict(method: &str, pattern: &str, reason: impl Into<String>) -> Self {
        Self::RouteConflict {
            method: method.to_string(),
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<minijinja::Error> for RouterError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;
