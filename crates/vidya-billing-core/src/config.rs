//! Billing configuration

use std::time::Duration;

use vidya_types::{EntitlementDefaults, LimitType};

/// Outbox consumer tuning
#[derive(Debug, Clone, Copy)]
pub struct OutboxConfig {
    /// Items claimed per run
    pub batch_size: i64,
    /// Attempts before an item is marked failed
    pub max_attempts: i32,
    /// First retry delay; doubles per attempt
    pub base_backoff: Duration,
    /// Upper bound on the retry delay
    pub max_backoff: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_attempts: 8,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

/// Billing service configuration
#[derive(Clone)]
pub struct BillingConfig {
    /// Gateway key secret, used for client-side payment verification
    pub key_secret: String,
    /// Gateway webhook secret. `None` disables webhook signature checks.
    pub webhook_secret: Option<String>,
    /// Length of a new trial in days
    pub trial_days: i64,
    /// Shape of a lazily created free-tier entitlement
    pub free_tier: EntitlementDefaults,
    /// Rewarded referrals allowed per referrer per calendar month
    pub referral_monthly_cap: i64,
    /// Days granted per referral reward
    pub referral_reward_days: i32,
    /// Domain suffix of iCalendar UIDs
    pub calendar_uid_domain: String,
    /// Plan catalog cache lifetime
    pub plan_cache_ttl: Duration,
    pub outbox: OutboxConfig,
}

impl BillingConfig {
    /// Create a new billing config with defaults
    pub fn new(key_secret: impl Into<String>) -> Self {
        Self {
            key_secret: key_secret.into(),
            webhook_secret: None,
            trial_days: 7,
            free_tier: EntitlementDefaults::default(),
            referral_monthly_cap: 10,
            referral_reward_days: 30,
            calendar_uid_domain: "vidya.app".to_string(),
            plan_cache_ttl: Duration::from_secs(600),
            outbox: OutboxConfig::default(),
        }
    }

    /// Set the webhook secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_trial_days(mut self, days: i64) -> Self {
        self.trial_days = days;
        self
    }

    /// Set the daily free-tier limit
    pub fn with_free_daily_limit(mut self, limit: i32) -> Self {
        self.free_tier = EntitlementDefaults {
            limit_type: LimitType::Daily,
            limit_value: limit,
        };
        self
    }

    pub fn with_referral_rewards(mut self, monthly_cap: i64, reward_days: i32) -> Self {
        self.referral_monthly_cap = monthly_cap;
        self.referral_reward_days = reward_days;
        self
    }

    pub fn with_calendar_domain(mut self, domain: impl Into<String>) -> Self {
        self.calendar_uid_domain = domain.into();
        self
    }

    pub fn with_outbox(mut self, outbox: OutboxConfig) -> Self {
        self.outbox = outbox;
        self
    }
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("key_secret", &"<redacted>")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("trial_days", &self.trial_days)
            .field("free_tier", &self.free_tier)
            .field("referral_monthly_cap", &self.referral_monthly_cap)
            .field("referral_reward_days", &self.referral_reward_days)
            .field("calendar_uid_domain", &self.calendar_uid_domain)
            .field("plan_cache_ttl", &self.plan_cache_ttl)
            .field("outbox", &self.outbox)
            .finish()
    }
}
