//! Client error taxonomy
//!
//! Every fallible operation in the crate returns [`ClientResult`]. Errors are
//! surfaced to the direct caller and never downgraded to default values; the
//! client performs no automatic retry.

use crate::session::SessionPhase;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with a non-success status
    #[error("connection failure: {status} {reason}")]
    Connection {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase for the status
        reason: String,
    },

    /// Transport failed before a status was received
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Login failed or produced an unusable response
    #[error("failed to establish session")]
    SessionOpen(#[source] Box<ClientError>),

    /// Logout failed; the local token has still been discarded
    #[error("failed to close session")]
    SessionClose(#[source] Box<ClientError>),

    /// Illegal query parameters, detected before any network activity
    #[error("validation error: {0}")]
    Validation(String),

    /// A lifecycle call was made in a phase that does not allow it
    #[error("cannot {operation} while session is {phase}")]
    InvalidState {
        /// The rejected operation
        operation: &'static str,
        /// Phase the session was in
        phase: SessionPhase,
    },

    /// Login succeeded but no authentication cookie was issued
    #[error("empty authentication token in login response")]
    EmptyToken,

    /// The retrieval was cancelled through its cancel token
    #[error("request cancelled")]
    Cancelled,

    /// The retrieval did not finish before its deadline
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Splitting produced more leaf requests than allowed
    #[error("query splits into more than {limit} batches")]
    TooManyBatches {
        /// Maximum number of leaves
        limit: usize,
    },

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Build a connection failure from a response status
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        ClientError::Connection {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ClientError::from_status(status),
            None => ClientError::Network(e),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
