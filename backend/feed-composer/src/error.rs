/// Error types for feed-composer
///
/// `FeedError` is what the composition core surfaces upward; `AppError` is the HTTP
/// boundary's view of it. Degraded sources and composition failures are recovered
/// inside the core and never show up here.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

use crate::repository::RepositoryError;

/// Errors surfaced by the feed core
#[derive(Error, Debug)]
pub enum FeedError {
    /// No user with the given id; nothing can be personalized
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Repository failed while resolving the user or their relationships
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<RepositoryError> for FeedError {
    fn from(err: RepositoryError) -> Self {
        FeedError::UpstreamUnavailable(err.to_string())
    }
}

/// Result type alias for core operations
pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Machine-readable error codes returned in response bodies
pub mod error_codes {
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const UPSTREAM_UNAVAILABLE: &str = "UPSTREAM_UNAVAILABLE";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// HTTP-facing error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Detail is logged, never returned to the client
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for HTTP handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub code: String,
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::UserNotFound(user) => AppError::NotFound(format!("user {}", user)),
            FeedError::UpstreamUnavailable(detail) => AppError::ServiceUnavailable(detail),
            FeedError::InvalidRequest(msg) => AppError::BadRequest(msg),
        }
    }
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => error_codes::USER_NOT_FOUND,
            AppError::BadRequest(_) => error_codes::INVALID_REQUEST,
            AppError::ServiceUnavailable(_) => error_codes::UPSTREAM_UNAVAILABLE,
            AppError::Internal(_) => error_codes::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-safe message. Storage detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::NotFound(_) | AppError::BadRequest(_) => self.to_string(),
            AppError::ServiceUnavailable(_) => {
                "Content store is temporarily unavailable".to_string()
            }
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let response = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.public_message(),
            status: status.as_u16(),
            code: self.code().to_string(),
        };

        HttpResponse::build(status).json(response)
    }
}
