//! Axum extractors for authentication

use axum::extract::FromRequestParts;
use axum::http::header::{HeaderName, AUTHORIZATION, COOKIE};
use axum::http::request::Parts;

use vidya_auth_core::Identity;
use vidya_types::UserId;

use crate::error::ApiError;
use crate::state::AppState;

fn header_str(parts: &Parts, name: HeaderName) -> Option<&str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Caller authenticated by bearer token or session cookie
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    pub fn id(&self) -> UserId {
        self.0.user_id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state
            .auth
            .identify_request(header_str(parts, AUTHORIZATION), header_str(parts, COOKIE))
            .inspect_err(|e| {
                tracing::debug!(
                    code = e.error_code(),
                    status = e.status_code(),
                    "request not authenticated"
                )
            })?;
        Ok(Self(identity))
    }
}

/// Authenticated caller whose profile carries the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

impl AdminUser {
    pub fn id(&self) -> UserId {
        self.0.user_id
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;

        let is_admin = state
            .billing
            .profile(identity.user_id)
            .await?
            .is_some_and(|p| p.is_admin());
        if !is_admin {
            tracing::warn!(user_id = %identity.user_id, "admin route denied");
            return Err(ApiError::Forbidden);
        }
        Ok(Self(identity))
    }
}
