//! Request-path error types and their mapping onto HTTP responses.
//!
//! Every variant is terminal for the request and becomes exactly one
//! response. Processing failures are logged in full here and reach the
//! caller only as a generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::identity::VerifyError;
use crate::store::StoreError;

// ---

/// Failures after authentication: reading, parsing, validation or persistence.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to read request body: {0}")]
    Body(axum::Error),

    #[error("malformed vitals payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid vitals reading: {0}")]
    Validation(String),

    #[error("failed to persist vitals: {0}")]
    Persistence(#[from] StoreError),
}

/// Everything that can end an ingestion request early.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("no bearer token provided")]
    MissingToken,

    #[error("authorization header is not a bearer token")]
    MalformedToken,

    #[error("token verification failed: {0}")]
    InvalidToken(#[from] VerifyError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl IngestError {
    // ---
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            IngestError::MissingToken
            | IngestError::MalformedToken
            | IngestError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            IngestError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text returned to the caller.
    pub fn public_message(&self) -> String {
        match self {
            IngestError::MethodNotAllowed => "Only POST requests are accepted".to_string(),
            IngestError::MissingToken => "Unauthorized: No token provided".to_string(),
            IngestError::MalformedToken => "Unauthorized: Invalid token format".to_string(),
            IngestError::InvalidToken(e) => format!("Invalid token: {e}"),
            IngestError::Processing(_) => "Error processing vitals".to_string(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        // ---
        match &self {
            IngestError::Processing(e) => tracing::error!("Error processing vitals: {}", e),
            other => tracing::warn!("Rejected vitals request: {}", other),
        }
        (self.status_code(), self.public_message()).into_response()
    }
}
