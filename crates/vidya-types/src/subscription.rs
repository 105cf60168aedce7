//! Subscription types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ParseEnumError, UserId};

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In trial period
    Trial,
    /// Paid and running
    Active,
    /// Canceled by the user; usable until the paid period ends
    Canceled,
    /// Period ended
    Expired,
    /// Paused by an operator
    Paused,
}

impl SubscriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Paused => "paused",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "active" => Ok(Self::Active),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "expired" => Ok(Self::Expired),
            "paused" => Ok(Self::Paused),
            other => Err(ParseEnumError::new("subscription status", other)),
        }
    }
}

/// A user's subscription. At most one per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub trial_started_at: Option<DateTime<Utc>>,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    /// Payment gateway subscription id (recurring plans)
    pub gateway_subscription_id: Option<String>,
    /// Payment gateway customer id
    pub gateway_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Trial is running: status is `trial` and the trial has not lapsed.
    pub fn is_trial_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Trial
            && self.trial_expires_at.is_some_and(|end| now < end)
    }

    /// Paid subscription is running: status is `active` and the period has not lapsed.
    pub fn is_subscription_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.subscription_expires_at.is_some_and(|end| now < end)
    }

    /// Canceled but still inside the paid period.
    pub fn is_in_canceled_grace(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Canceled
            && self.subscription_expires_at.is_some_and(|end| now < end)
    }

    /// Whether the subscription currently grants paid-tier access.
    pub fn has_access(&self, now: DateTime<Utc>) -> bool {
        self.is_trial_active(now) || self.is_subscription_active(now) || self.is_in_canceled_grace(now)
    }

    /// End of the window relevant to the current status.
    pub fn current_period_end(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SubscriptionStatus::Trial => self.trial_expires_at,
            _ => self.subscription_expires_at,
        }
    }

    /// Whether the row is still flagged trial/active/canceled but its window has passed
    /// (a missing end date counts as lapsed).
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Trial
            | SubscriptionStatus::Active
            | SubscriptionStatus::Canceled => self.current_period_end().is_none_or(|end| now >= end),
            SubscriptionStatus::Expired | SubscriptionStatus::Paused => false,
        }
    }

    /// Whole days left in the current window (0 once lapsed)
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.current_period_end()
            .map(|end| (end - now).num_days().max(0))
            .unwrap_or(0)
    }
}

/// Paid period granted by a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionWindow {
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SubscriptionWindow {
    /// Window of `duration_days` starting at `now`
    pub fn starting_at(now: DateTime<Utc>, duration_days: i32) -> Self {
        Self {
            started_at: now,
            expires_at: now + chrono::Duration::days(i64::from(duration_days)),
        }
    }
}
