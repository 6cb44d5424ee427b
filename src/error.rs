//! # Error Handling
//!
//! One error type for the whole application and its two renderings:
//! an HTTP response for the REST endpoints and an `error` event for
//! WebSocket clients.
//!
//! ## Error Categories:
//! - **Internal**: a collaborator or the server itself failed (500)
//! - **BadRequest**: the client sent something unusable (400)
//! - **NotFound**: the referenced session does not exist (404)
//! - **ConfigError**: configuration could not be loaded or applied (500)
//! - **ValidationError**: well-formed input that breaks a rule (400)
//!
//! Server-side categories never leak their message to clients; they are
//! logged and replaced with a generic apology.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Text shown to clients in place of server-side error details.
pub const GENERIC_APOLOGY: &str = "Sorry, something went wrong on our side. Please try again.";

#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    ConfigError(String),
    ValidationError(String),
}

impl AppError {
    /// Machine-readable category, shared by HTTP bodies and WebSocket events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
        }
    }

    /// Message that is safe to show the client.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => GENERIC_APOLOGY.to_string(),
            AppError::BadRequest(msg) | AppError::NotFound(msg) | AppError::ValidationError(msg) => {
                msg.clone()
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, AppError::Internal(_) | AppError::ConfigError(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

/// JSON error body for REST handlers:
///
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "Session 'abc' not found",
///     "timestamp": "2026-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.code(),
                "message": self.client_message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Collaborator and I/O failures surface as internal errors.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

/// JSON problems are almost always the client's payload.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
