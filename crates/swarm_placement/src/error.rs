//! # Placement Error Types

use thiserror::Error;

/// Errors returned by a placement service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// A describe call failed.
    #[error("describe failed: {0}")]
    RemoteDescribe(String),

    /// A create/search/reserve/place call failed.
    #[error("{action} failed: {message}")]
    RemoteAction {
        /// Which call failed.
        action: &'static str,
        /// Service-provided message.
        message: String,
    },

    /// A reservation asked for more players than one call allows.
    #[error("too many players in one call: requested {requested}, limit {limit}")]
    TooManyPlayers {
        /// Players requested.
        requested: usize,
        /// Per-call limit.
        limit: usize,
    },

    /// The named session or placement does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A descriptor carried an unusable endpoint.
    #[error("invalid endpoint {address}:{port}")]
    InvalidEndpoint {
        /// Reported address.
        address: String,
        /// Reported port.
        port: u16,
    },
}

impl PlacementError {
    /// Shorthand for a [`PlacementError::RemoteAction`] error.
    #[must_use]
    pub fn action(action: &'static str, message: impl Into<String>) -> Self {
        Self::RemoteAction {
            action,
            message: message.into(),
        }
    }

    /// Returns true if this error came from a describe call.
    #[must_use]
    pub const fn is_describe(&self) -> bool {
        matches!(self, Self::RemoteDescribe(_))
    }
}

/// Result type for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;
