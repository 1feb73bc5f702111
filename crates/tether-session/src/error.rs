//! Error types for session registry operations.

/// Error type for session registry operations.
///
/// Every variant is a reported outcome that callers are expected to branch
/// on; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An argument was missing or had the wrong shape.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No record exists for the identifier (never created, destroyed, or evicted).
    #[error("Session does not exist: {0}")]
    SessionInvalid(String),

    /// A record with the identifier is already present.
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// The lookup itself found the session idle and evicted it.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Connect was called on a session that is already connected.
    #[error("Session already connected: {0}")]
    SessionConnected(String),

    /// The operation requires a connected session.
    #[error("Session not connected: {0}")]
    SessionNotConnected(String),

    /// The requested key is not present in the session's data.
    #[error("Data key '{key}' not found in session {identifier}")]
    DataKeyInvalid { identifier: String, key: String },
}

/// Result type for session registry operations.
pub type Result<T> = std::result::Result<T, Error>;
