//! Configuration types for access-token validation

use std::time::Duration;

/// Audience the auth service puts on end-user tokens
pub const DEFAULT_AUDIENCE: &str = "authenticated";

/// Cookie carrying the access token for browser clients
pub const DEFAULT_COOKIE_NAME: &str = "sb-access-token";

/// Auth configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the auth service
    pub jwt_secret: String,
    /// Required `aud` claim
    pub audience: String,
    /// Expected `iss` claim, if any
    pub issuer: Option<String>,
    /// Cookie consulted when no bearer header is sent
    pub cookie_name: String,
    /// Clock skew tolerated on `exp`
    pub leeway: Duration,
}

impl AuthConfig {
    /// Create a new auth config
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            audience: DEFAULT_AUDIENCE.to_string(),
            issuer: None,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            leeway: Duration::from_secs(30),
        }
    }

    /// Set the required audience
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Require an issuer, e.g. `https://<project>.supabase.co/auth/v1`
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("cookie_name", &self.cookie_name)
            .field("leeway", &self.leeway)
            .finish()
    }
}
