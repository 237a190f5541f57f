//! Error types for ayush-client

use crate::services::error_normalizer::NormalizedError;
use thiserror::Error;

/// Client operation error
#[derive(Debug, Error)]
pub enum ClientError {
    /// Local validation failed before any remote call
    ///
    /// The message is user-facing and shown verbatim.
    #[error("{0}")]
    InvalidInput(String),

    /// Remote call failed; already normalized for display
    #[error("{0}")]
    Remote(#[from] NormalizedError),

    /// ayush-common error
    #[error("Common error: {0}")]
    Common(#[from] ayush_common::Error),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ClientError::InvalidInput(message.into())
    }

    /// Normalized remote failure, if this is one
    pub fn as_remote(&self) -> Option<&NormalizedError> {
        match self {
            ClientError::Remote(normalized) => Some(normalized),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
