//! Vidya Auth Core - Access-token validation
//!
//! Verifies the HS256 access tokens issued by the auth service and resolves
//! the calling user from a bearer header or the session cookie.

pub mod config;
pub mod error;
pub mod token;

pub use config::{AuthConfig, DEFAULT_AUDIENCE, DEFAULT_COOKIE_NAME};
pub use error::AuthError;
pub use token::{extract_token, AccessClaims, Identity, TokenValidator};
