//! Error types for the Vidya API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vidya_auth_core::AuthError;
use vidya_billing_core::BillingError;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Admin access required")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error")]
    Database(#[from] vidya_db::DbError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Conflict(_) | Self::InvalidSignature => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Internal(_) | Self::Database(_) => "INTERNAL_ERROR",
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Database(_))
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::SubscriptionNotFound => Self::NotFound("Subscription not found"),
            BillingError::OrderNotFound => Self::NotFound("Order not found"),
            BillingError::PlanNotFound => Self::NotFound("Plan not found"),
            BillingError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            BillingError::InvalidSignature => Self::InvalidSignature,
            BillingError::MalformedEvent(msg) => Self::BadRequest(msg),
            BillingError::Database(e) => Self::Database(e),
            BillingError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Self::Unauthorized("Authentication required"),
            AuthError::InvalidToken => Self::Unauthorized("Invalid access token"),
            AuthError::TokenExpired => Self::Unauthorized("Access token expired"),
            AuthError::Forbidden => Self::Forbidden,
            AuthError::Configuration(msg) => Self::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let message = if self.is_internal() {
            tracing::error!(error = ?self, "Internal API error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vidya_types::SubscriptionStatus;

    #[test]
    fn test_billing_error_mapping() {
        let cases = [
            (BillingError::OrderNotFound, StatusCode::NOT_FOUND),
            (BillingError::InvalidSignature, StatusCode::BAD_REQUEST),
            (
                BillingError::InvalidTransition {
                    from: SubscriptionStatus::Trial,
                    to: SubscriptionStatus::Canceled,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                BillingError::MalformedEvent("bad json".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                BillingError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            ApiError::from(AuthError::TokenExpired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
