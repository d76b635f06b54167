//! Client error types.

use thiserror::Error;

/// Errors surfaced to callers of the Taskpay client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No usable session: the refresh attempt was exhausted or no access
    /// token is held. The caller must log in again.
    #[error("session expired")]
    SessionExpired,

    /// The server rejected the credentials after a successful refresh; the
    /// failure is surfaced unmodified rather than retried.
    #[error("unauthorized")]
    Unauthorized,

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Credential persistence failure (load or store).
    #[error("credential storage error: {0}")]
    Storage(String),
}

/// Errors produced by a [`crate::session::Transport`] implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The server rejected the access credential (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => ClientError::Unauthorized,
            TransportError::Api { status, message } => ClientError::Api { status, message },
            TransportError::Connection(msg) => ClientError::Connection(msg),
            TransportError::Timeout(msg) => ClientError::Timeout(msg),
            TransportError::InvalidResponse(msg) => ClientError::InvalidResponse(msg),
        }
    }
}
