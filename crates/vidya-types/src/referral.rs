//! Referral types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ParseEnumError, UserId};

/// Referral progress. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    SignedUp,
    Subscribed,
    Rewarded,
}

impl ReferralStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::SignedUp => "signed_up",
            Self::Subscribed => "subscribed",
            Self::Rewarded => "rewarded",
        }
    }

    /// Whether moving from `self` to `next` is a forward step
    pub fn can_advance_to(&self, next: Self) -> bool {
        next > *self
    }

    /// All statuses strictly before `self`
    pub fn predecessors(&self) -> Vec<Self> {
        [Self::Pending, Self::SignedUp, Self::Subscribed, Self::Rewarded]
            .into_iter()
            .filter(|s| s < self)
            .collect()
    }

    /// Counts toward referral conversion (the referred user paid)
    pub fn is_converted(&self) -> bool {
        *self >= Self::Subscribed
    }
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferralStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "signed_up" => Ok(Self::SignedUp),
            "subscribed" => Ok(Self::Subscribed),
            "rewarded" => Ok(Self::Rewarded),
            other => Err(ParseEnumError::new("referral status", other)),
        }
    }
}

/// How a referral reward was applied to the referrer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    /// Existing active subscription extended
    SubscriptionExtension,
    /// Referrer had no running subscription; a free period was granted
    FreeMonth,
}

impl RewardType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriptionExtension => "subscription_extension",
            Self::FreeMonth => "free_month",
        }
    }
}

impl std::str::FromStr for RewardType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription_extension" => Ok(Self::SubscriptionExtension),
            "free_month" => Ok(Self::FreeMonth),
            other => Err(ParseEnumError::new("reward type", other)),
        }
    }
}

/// One (referrer, referred) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: UserId,
    pub referred_id: UserId,
    pub referral_code: String,
    pub status: ReferralStatus,
    pub reward_type: Option<RewardType>,
    /// Reward size in days
    pub reward_value: Option<i32>,
    pub reward_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate referral counts used for the K-factor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCounts {
    pub total: i64,
    /// Referrals whose referred user paid. A `rewarded` referral went
    /// through `subscribed` first, so it counts as converted too.
    pub converted: i64,
}

/// Reward granted to a referrer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    pub reward_type: RewardType,
    pub days: i32,
    pub referrer_id: UserId,
    pub new_expires_at: DateTime<Utc>,
}

/// Outcome of applying a referral reward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<Reward>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RewardOutcome {
    pub fn rewarded(reward: Reward) -> Self {
        Self {
            success: true,
            reward: Some(reward),
            message: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: true,
            reward: None,
            message: Some(message.into()),
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            success: false,
            reward: None,
            message: Some(message.into()),
        }
    }
}
