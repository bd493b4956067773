// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// Room or member vanished. Authoritative, not a retry target.
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Only the creator may delete a room.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Room is full. The caller may retry against fresh state.
    #[error("Room is full: {0}")]
    CapacityExceeded(String),

    /// Requested state change does not apply to the member's current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Wrong password for a private room.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// A single document operation failed in a way that is safe to retry.
    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the failed operation may be retried as-is.
    ///
    /// All store mutations are idempotent or additive deltas, so only
    /// transient store failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }

    /// Stable machine-readable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidToken => "invalid_token",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::CapacityExceeded(_) => "capacity_exceeded",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::AccessDenied(_) => "access_denied",
            AppError::TransientStore(_) => "store_unavailable",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AppError::Unauthorized | AppError::InvalidToken => (StatusCode::UNAUTHORIZED, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Some(msg.clone())),
            AppError::PermissionDenied(msg) | AppError::AccessDenied(msg) => {
                (StatusCode::FORBIDDEN, Some(msg.clone()))
            }
            AppError::CapacityExceeded(msg) | AppError::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, Some(msg.clone()))
            }
            AppError::TransientStore(msg) => {
                tracing::warn!(error = %msg, "Store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
