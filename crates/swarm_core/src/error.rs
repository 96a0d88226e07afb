//! # Session Error Types
//!
//! Errors raised when posting work to a session.
//!
//! I/O failures reported by the completion engine are NOT errors here: they
//! are folded into the disconnect protocol and surface through
//! `SessionHandler::on_disconnect` with a [`DisconnectReason`].
//!
//! [`DisconnectReason`]: crate::DisconnectReason

use thiserror::Error;

/// Errors that can occur when posting session I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No connection handle is bound, or the engine refused the operation.
    #[error("failed to post {operation}: {reason}")]
    IoPost {
        /// Operation that was being posted.
        operation: &'static str,
        /// Why the post was rejected.
        reason: String,
    },

    /// Outbound data does not fit in the send buffer.
    #[error("send buffer full: requested {requested} bytes, {available} available")]
    SendBufferFull {
        /// Bytes the caller tried to queue.
        requested: usize,
        /// Free space at call time.
        available: usize,
    },

    /// The session is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// The completion engine could not be started.
    #[error("completion engine failed to start: {0}")]
    EngineStart(String),
}

impl SessionError {
    /// Shorthand for an [`SessionError::IoPost`] error.
    #[must_use]
    pub fn io_post(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::IoPost {
            operation,
            reason: reason.into(),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
