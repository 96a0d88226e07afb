//! # Acquisition Error Types

use swarm_core::SessionError;
use swarm_placement::PlacementError;
use thiserror::Error;

/// Errors raised by the session-acquisition workflow.
#[derive(Error, Debug)]
pub enum AcquireError {
    /// A placement-service describe call failed.
    #[error("remote describe failed: {0}")]
    RemoteDescribe(String),

    /// A placement-service create/search/reserve/place call failed.
    #[error("remote {action} failed: {message}")]
    RemoteAction {
        /// Which call failed.
        action: &'static str,
        /// Service-provided message.
        message: String,
    },

    /// A connect submission failed after `issued` others were submitted.
    #[error("connect {issued} of {total} failed: {source}")]
    PartialConnectFailure {
        /// Connects submitted before the failure.
        issued: usize,
        /// Connects that were planned.
        total: usize,
        /// Why the failing submission was rejected.
        source: SessionError,
    },

    /// A poll loop reached its deadline or attempt limit.
    #[error("timed out after {attempts} polls")]
    TimedOut {
        /// Polls issued before giving up.
        attempts: u32,
    },

    /// A poll loop was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The operation needs a negotiated session.
    #[error("no remote session negotiated")]
    NoSession,

    /// The session or placement ended in a state that will never be usable.
    #[error("remote {what} ended as {status}")]
    TerminalStatus {
        /// "session" or "placement".
        what: &'static str,
        /// Final status, as reported.
        status: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local I/O failure (config file, worker spawn).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PlacementError> for AcquireError {
    fn from(error: PlacementError) -> Self {
        match error {
            PlacementError::RemoteDescribe(message) => Self::RemoteDescribe(message),
            PlacementError::RemoteAction { action, message } => Self::RemoteAction { action, message },
            other => Self::RemoteAction {
                action: "placement",
                message: other.to_string(),
            },
        }
    }
}

/// Result type for acquisition operations.
pub type AcquireResult<T> = Result<T, AcquireError>;
