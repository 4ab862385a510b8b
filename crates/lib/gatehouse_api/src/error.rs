//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatehouse_core::auth::AuthError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {message}")]
    Forbidden {
        message: String,
        params: Option<serde_json::Value>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Map a token authentication failure the way it is shown to callers:
    /// every authentication or upstream failure is a 401, a scope denial is
    /// a 403 with its diagnostic params, and store failures stay 500.
    pub fn from_token_error(e: AuthError) -> Self {
        match e {
            AuthError::ScopeForbidden(_) | AuthError::Store(_) => AppError::from(e),
            AuthError::CredentialInvalid(detail) => {
                debug!(%detail, "credential rejected");
                AppError::Unauthorized("Invalid credential".into())
            }
            other => AppError::Unauthorized(other.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream { status, .. } => *status,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, message, params) = match self {
            AppError::Validation(m) => ("validation_error", m, None),
            AppError::Unauthorized(m) => ("unauthorized", m, None),
            AppError::Forbidden { message, params } => ("forbidden", message, params),
            AppError::NotFound(m) => ("not_found", m, None),
            AppError::Upstream { message, .. } => ("upstream_error", message, None),
            AppError::Unavailable(m) => ("unavailable", m, None),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                ("internal_error", "Internal server error".to_string(), None)
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
            params,
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialRequired => AppError::Validation(e.to_string()),
            AuthError::CredentialInvalid(detail) => {
                debug!(%detail, "credential rejected");
                AppError::Forbidden {
                    message: "Invalid credential".into(),
                    params: None,
                }
            }
            AuthError::TokenNotFound | AuthError::TokenExpired => {
                AppError::Unauthorized(e.to_string())
            }
            AuthError::UserNotFound => AppError::NotFound(e.to_string()),
            AuthError::ScopeForbidden(ref denial) => AppError::Forbidden {
                message: e.to_string(),
                params: Some(denial.params()),
            },
            AuthError::UpstreamUnavailable { .. } | AuthError::UpstreamTimeout => {
                AppError::Upstream {
                    status: StatusCode::from_u16(e.status_code())
                        .unwrap_or(StatusCode::BAD_GATEWAY),
                    message: e.to_string(),
                }
            }
            AuthError::KeyRefreshFailed(_) => AppError::Unavailable(e.to_string()),
            AuthError::Store(_) => AppError::Internal(e.to_string()),
        }
    }
}
