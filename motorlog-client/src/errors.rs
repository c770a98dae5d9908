use thiserror::Error;

use crate::models::ErrorBody;

/// Errors that can occur when talking to the motorlog backend
#[derive(Error, Debug)]
pub enum ApiClientError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend returned error {status}: {}", body.message())]
    Server { status: u16, body: ErrorBody },

    #[error("authentication expired ({status}): {}", body.message())]
    AuthExpired { status: u16, body: ErrorBody },

    #[error("session storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ApiClientError {
    /// HTTP status carried by the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiClientError::Server { status, .. } | ApiClientError::AuthExpired { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Human-readable message suitable for toast/inline display.
    pub fn display_message(&self) -> String {
        match self {
            ApiClientError::Server { body, .. } | ApiClientError::AuthExpired { body, .. } => {
                body.message()
            }
            other => other.to_string(),
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ApiClientError>;
