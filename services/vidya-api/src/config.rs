//! Configuration for the Vidya API service.

use std::str::FromStr;
use std::time::Duration;

use vidya_auth_core::AuthConfig;
use vidya_billing_core::BillingConfig;

/// API configuration
#[derive(Clone)]
pub struct Config {
    /// HTTP server port
    pub http_port: u16,
    /// Database URL
    pub database_url: String,
    /// Access-token validation
    pub auth: AuthConfig,
    /// Billing core configuration
    pub billing: BillingConfig,
    /// Request timeout
    pub request_timeout: Duration,
    /// Metrics enabled
    pub metrics_enabled: bool,
    /// Outbox poll interval; `None` disables the background processor
    pub outbox_poll: Option<Duration>,
    /// Apply migrations at startup
    pub run_migrations: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("SUPABASE_JWT_SECRET")?;
        let key_secret = required("RAZORPAY_KEY_SECRET")?;
        let webhook_secret = lookup("RAZORPAY_WEBHOOK_SECRET").filter(|v| !v.trim().is_empty());

        let http_port = parse_or(&lookup, "HTTP_PORT", 8080u16)?;
        let trial_days = parse_or(&lookup, "TRIAL_DAYS", 7i64)?;
        let free_daily_limit = parse_or(&lookup, "FREE_DAILY_LIMIT", 3i32)?;
        let referral_cap = parse_or(&lookup, "REFERRAL_MONTHLY_CAP", 10i64)?;
        let referral_days = parse_or(&lookup, "REFERRAL_REWARD_DAYS", 30i32)?;
        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;
        let outbox_poll_secs = parse_or(&lookup, "OUTBOX_POLL_SECS", 15u64)?;
        let metrics_enabled = parse_or(&lookup, "METRICS_ENABLED", true)?;
        let run_migrations = parse_or(&lookup, "RUN_MIGRATIONS", true)?;
        let calendar_domain =
            lookup("CALENDAR_UID_DOMAIN").unwrap_or_else(|| "vidya.app".to_string());

        if trial_days <= 0 {
            return Err(ConfigError::Invalid("TRIAL_DAYS"));
        }
        if free_daily_limit < 0 {
            return Err(ConfigError::Invalid("FREE_DAILY_LIMIT"));
        }

        let mut billing = BillingConfig::new(key_secret)
            .with_trial_days(trial_days)
            .with_free_daily_limit(free_daily_limit)
            .with_referral_rewards(referral_cap, referral_days)
            .with_calendar_domain(calendar_domain);
        if let Some(secret) = webhook_secret {
            billing = billing.with_webhook_secret(secret);
        }

        Ok(Self {
            http_port,
            database_url,
            auth: AuthConfig::new(jwt_secret),
            billing,
            request_timeout: Duration::from_secs(request_timeout_secs),
            metrics_enabled,
            outbox_poll: (outbox_poll_secs > 0).then(|| Duration::from_secs(outbox_poll_secs)),
            run_migrations,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("auth", &self.auth)
            .field("billing", &self.billing)
            .field("request_timeout", &self.request_timeout)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("outbox_poll", &self.outbox_poll)
            .field("run_migrations", &self.run_migrations)
            .finish_non_exhaustive()
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
