//! Unified error handling for Authgate Core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed, expired or forged bearer credential
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// No permission is mapped to the requested route
    #[error("Permission not found: {0}")]
    PermissionNotFound(String),

    /// A lookup yielded a record owned by a tenant other than the caller's
    #[error("Cross-tenant reference: expected tenant {expected}, got {actual}")]
    CrossTenantReference { expected: String, actual: String },

    #[error("Invalid tenant override: {0}")]
    InvalidTenantOverride(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn cross_tenant(expected: impl ToString, actual: impl ToString) -> Self {
        AppError::CrossTenantReference {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True for failures that must surface as a server-side fault rather
    /// than an allow/deny outcome.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            AppError::CrossTenantReference { .. } | AppError::Database(_) | AppError::Internal(_)
        )
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::InvalidCredential(msg) => {
                tracing::debug!("Rejected credential: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    "invalid_credential",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::PermissionNotFound(msg) => {
                tracing::debug!("No permission mapping: {}", msg);
                (StatusCode::FORBIDDEN, "permission_not_found", msg.clone())
            }
            AppError::CrossTenantReference { expected, actual } => {
                tracing::error!(
                    expected_tenant = %expected,
                    actual_tenant = %actual,
                    "Cross-tenant reference detected"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "cross_tenant_reference",
                    "Tenant isolation violation".to_string(),
                )
            }
            AppError::InvalidTenantOverride(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_tenant_override", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Jwt(e) => {
                tracing::debug!("JWT error: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "invalid_credential",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::PermissionNotFound("GET /api/x".to_string());
        assert_eq!(err.to_string(), "Permission not found: GET /api/x");
    }

    #[test]
    fn test_cross_tenant_display() {
        let err = AppError::cross_tenant("a", "b");
        assert_eq!(
            err.to_string(),
            "Cross-tenant reference: expected tenant a, got b"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: AppError = anyhow::anyhow!("Something went wrong").into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_is_fault() {
        assert!(AppError::cross_tenant("a", "b").is_fault());
        assert!(AppError::Database(sqlx::Error::RowNotFound).is_fault());
        assert!(!AppError::PermissionNotFound("x".into()).is_fault());
        assert!(!AppError::InvalidCredential("x".into()).is_fault());
    }

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::InvalidCredential("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::PermissionNotFound("x".into()), StatusCode::FORBIDDEN),
            (
                AppError::cross_tenant("a", "b"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::InvalidTenantOverride("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                AppError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
