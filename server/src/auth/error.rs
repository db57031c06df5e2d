//! Authentication Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No valid session cookie.
    #[error("Authentication required")]
    NotAuthenticated,

    /// Signed in without the required role.
    #[error("Missing required role: {0}")]
    MissingRole(String),

    /// Session lookup failed.
    #[error("Session store unavailable")]
    Store(#[from] StoreError),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "NOT_AUTHENTICATED"),
            Self::MissingRole(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if let Self::Store(e) = &self {
            tracing::error!(error = %e, "Session lookup failed");
        }

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
