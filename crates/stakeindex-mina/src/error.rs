//! Client-side error types for the Mina GraphQL API.

use stakeindex_core::error::IndexerError;
use thiserror::Error;

/// Errors raised while talking to a Mina daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, reset, timed out, etc.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The query ran but the daemon reported errors.
    #[error("GraphQL error: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// The response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A field could not be turned into a model value.
    #[error("Mapping error: {0}")]
    Mapping(String),
}

impl ClientError {
    /// Returns `true` if the request may succeed when sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Http(e.to_string())
        }
    }
}

impl From<ClientError> for IndexerError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Mapping(msg) => IndexerError::Validation(msg),
            other => IndexerError::Rpc(other.to_string()),
        }
    }
}
