//! Session errors.

use thiserror::Error;

/// Errors from opening, querying, committing or closing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Device unreachable or authentication failed.
    #[error("connection to {device} failed: {reason}")]
    Connection {
        /// Device name.
        device: String,
        /// Why the connection failed.
        reason: String,
    },

    /// Commit rejected or failed. Device state is assumed unchanged.
    #[error("commit on {device} failed: {reason}")]
    ConfigApply {
        /// Device name.
        device: String,
        /// Why the commit failed.
        reason: String,
    },

    /// State query failed.
    #[error("state query on {device} failed: {reason}")]
    Query {
        /// Device name.
        device: String,
        /// Why the query failed.
        reason: String,
    },

    /// Session used after close.
    #[error("session to {device} is closed")]
    Closed {
        /// Device name.
        device: String,
    },

    /// Spawning the ssh process failed.
    #[error("ssh spawn error: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SessionError {
    /// Whether this is a connection-level failure.
    pub fn is_connection(&self) -> bool {
        matches!(self, SessionError::Connection { .. } | SessionError::Spawn(_))
    }
}
