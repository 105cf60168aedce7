//! Access-token validation
//!
//! End-user tokens are HS256 JWTs issued by the auth service. `sub` is the
//! user's UUID and `aud` must match the configured audience. Browsers send the
//! token in the `sb-access-token` cookie, API clients as a bearer header.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use vidya_types::UserId;

use crate::{AuthConfig, AuthError};

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User UUID
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Auth-service role (`authenticated`, `anon`, ...), not the app role
    #[serde(default)]
    pub role: Option<String>,
}

impl AccessClaims {
    /// Subject as a user id
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        Uuid::parse_str(&self.sub)
            .map(UserId)
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// Caller identity established from a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: Option<String>,
}

/// Pick the token out of an `Authorization` header or a `Cookie` header.
///
/// A bearer header wins over the cookie. Empty values count as absent.
pub fn extract_token(
    authorization: Option<&str>,
    cookie_header: Option<&str>,
    cookie_name: &str,
) -> Option<String> {
    let bearer = authorization.and_then(|value| {
        let (scheme, token) = value.trim().split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    });
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Token validator
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Create a validator. Fails on an empty secret.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Configuration("JWT secret is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway.as_secs();
        // Audience and issuer are compared below in constant time.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub", "aud"]);

        Ok(Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Validate a token and return its claims
    pub fn validate(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token validation failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;
        let claims = data.claims;

        if !eq(&claims.aud, &self.config.audience) {
            tracing::debug!(aud = %claims.aud, "token audience mismatch");
            return Err(AuthError::InvalidToken);
        }
        if let Some(issuer) = &self.config.issuer {
            if !claims.iss.as_deref().is_some_and(|iss| eq(iss, issuer)) {
                tracing::debug!(iss = ?claims.iss, "token issuer mismatch");
                return Err(AuthError::InvalidToken);
            }
        }

        Ok(claims)
    }

    /// Validate a token and resolve the caller
    pub fn identify(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.validate(token)?;
        Ok(Identity {
            user_id: claims.user_id()?,
            email: claims.email,
        })
    }

    /// Resolve the caller from raw request headers
    pub fn identify_request(
        &self,
        authorization: Option<&str>,
        cookie_header: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let token = extract_token(authorization, cookie_header, &self.config.cookie_name)
            .ok_or(AuthError::MissingToken)?;
        self.identify(&token)
    }
}

fn eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
