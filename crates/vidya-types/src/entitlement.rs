//! Entitlement and feature usage types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ParseEnumError, UserId};

/// Feature identifier (e.g. `doubt_video`, `answer_evaluation`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSlug(pub String);

impl FeatureSlug {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureSlug {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How an entitlement's usage is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    /// `limit_value` uses per rolling day
    Daily,
    /// No bound; `limit_value` is ignored
    Unlimited,
}

impl LimitType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Unlimited => "unlimited",
        }
    }
}

impl std::str::FromStr for LimitType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "unlimited" => Ok(Self::Unlimited),
            other => Err(ParseEnumError::new("limit type", other)),
        }
    }
}

/// Per (user, feature) usage counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: UserId,
    pub feature_slug: FeatureSlug,
    pub limit_type: LimitType,
    pub limit_value: i32,
    pub usage_count: i32,
    pub last_reset_at: DateTime<Utc>,
}

impl Entitlement {
    /// Check if the entitlement has remaining usage
    pub fn has_remaining(&self) -> bool {
        match self.limit_type {
            LimitType::Unlimited => true,
            LimitType::Daily => self.usage_count < self.limit_value,
        }
    }
}

/// Default shape of a lazily created entitlement row
#[derive(Debug, Clone, Copy)]
pub struct EntitlementDefaults {
    pub limit_type: LimitType,
    pub limit_value: i32,
}

impl Default for EntitlementDefaults {
    fn default() -> Self {
        Self {
            limit_type: LimitType::Daily,
            limit_value: 3,
        }
    }
}

/// Why an entitlement check was decided the way it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitlementReason {
    #[serde(rename = "No subscription found")]
    NoSubscription,
    #[serde(rename = "trial_active")]
    TrialActive,
    #[serde(rename = "subscription_active")]
    SubscriptionActive,
    #[serde(rename = "unlimited")]
    Unlimited,
    #[serde(rename = "daily_limit_reset")]
    DailyLimitReset,
    #[serde(rename = "within_limit")]
    WithinLimit,
    #[serde(rename = "limit_reached")]
    LimitReached,
}

impl EntitlementReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoSubscription => "No subscription found",
            Self::TrialActive => "trial_active",
            Self::SubscriptionActive => "subscription_active",
            Self::Unlimited => "unlimited",
            Self::DailyLimitReset => "daily_limit_reset",
            Self::WithinLimit => "within_limit",
            Self::LimitReached => "limit_reached",
        }
    }
}

impl std::fmt::Display for EntitlementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entitlement check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementCheck {
    pub allowed: bool,
    pub reason: EntitlementReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_value: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_required: Option<bool>,
}

impl EntitlementCheck {
    /// Access granted without consulting usage counters
    pub fn granted(reason: EntitlementReason) -> Self {
        Self {
            allowed: true,
            reason,
            usage_count: None,
            limit_value: None,
            upgrade_required: None,
        }
    }

    /// Access granted by a counter that still has room
    pub fn metered(reason: EntitlementReason, entitlement: &Entitlement) -> Self {
        Self {
            allowed: true,
            reason,
            usage_count: Some(entitlement.usage_count),
            limit_value: Some(entitlement.limit_value),
            upgrade_required: None,
        }
    }

    /// Access denied; the client should prompt for an upgrade
    pub fn denied(reason: EntitlementReason, entitlement: Option<&Entitlement>) -> Self {
        Self {
            allowed: false,
            reason,
            usage_count: entitlement.map(|e| e.usage_count),
            limit_value: entitlement.map(|e| e.limit_value),
            upgrade_required: Some(true),
        }
    }
}

/// Result of an explicit usage increment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageIncrement {
    /// False when the counter was already at its limit
    pub incremented: bool,
    pub usage_count: i32,
    pub limit_value: i32,
    pub limit_type: LimitType,
}
