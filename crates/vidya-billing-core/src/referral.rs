//! Referral reward engine

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tracing::{info, instrument};

use vidya_db::{ReferralRepository, RewardCommit, RewardCommitOutcome, SubscriptionRepository};
use vidya_types::{ReferralStatus, Reward, RewardOutcome, RewardType, SubscriptionStatus, UserId};

use crate::error::BillingError;

pub const LIMIT_REACHED_MESSAGE: &str = "Monthly reward limit reached";

/// Midnight UTC on the first day of `now`'s month
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

/// Referral reward engine
#[derive(Clone)]
pub struct ReferralEngine {
    referrals: Arc<dyn ReferralRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    monthly_cap: i64,
    reward_days: i32,
}

impl ReferralEngine {
    pub fn new(
        referrals: Arc<dyn ReferralRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        monthly_cap: i64,
        reward_days: i32,
    ) -> Self {
        Self {
            referrals,
            subscriptions,
            monthly_cap,
            reward_days,
        }
    }

    /// Reward the referrer of `referred_id`.
    ///
    /// Missing or already rewarded referrals succeed without changes. A
    /// referrer at the monthly cap is denied and nothing is written.
    #[instrument(skip(self), fields(referred_id = %referred_id))]
    pub async fn apply_reward(
        &self,
        referred_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<RewardOutcome, BillingError> {
        let Some(referral) = self.referrals.find_by_referred(referred_id).await? else {
            return Ok(RewardOutcome::skipped("No referral found"));
        };
        if referral.status == ReferralStatus::Rewarded {
            return Ok(RewardOutcome::skipped("Referral already rewarded"));
        }

        let since = month_start(now);
        let rewarded = self
            .referrals
            .count_rewarded_since(referral.referrer_id, since)
            .await?;
        if rewarded >= self.monthly_cap {
            info!(referrer_id = %referral.referrer_id, rewarded, "referral cap reached");
            return Ok(RewardOutcome::denied(LIMIT_REACHED_MESSAGE));
        }

        let referrer_active = self
            .subscriptions
            .find_by_user(referral.referrer_id)
            .await?
            .is_some_and(|s| s.status == SubscriptionStatus::Active);
        let mut reward_type = if referrer_active {
            RewardType::SubscriptionExtension
        } else {
            RewardType::FreeMonth
        };

        // One retry as a free month if the referrer's subscription lapsed mid-flight.
        for _ in 0..2 {
            let commit = RewardCommit {
                referral_id: referral.id,
                referrer_id: referral.referrer_id,
                referred_id,
                reward_type,
                days: self.reward_days,
                monthly_cap: self.monthly_cap,
                month_start: since,
                now,
            };

            match self.referrals.commit_reward(commit).await? {
                RewardCommitOutcome::Committed(sub) => {
                    let new_expires_at = sub
                        .subscription_expires_at
                        .unwrap_or(now + Duration::days(i64::from(self.reward_days)));
                    info!(
                        referrer_id = %referral.referrer_id,
                        reward_type = reward_type.as_str(),
                        "referral reward applied"
                    );
                    return Ok(RewardOutcome::rewarded(Reward {
                        reward_type,
                        days: self.reward_days,
                        referrer_id: referral.referrer_id,
                        new_expires_at,
                    }));
                }
                RewardCommitOutcome::AlreadyRewarded => {
                    return Ok(RewardOutcome::skipped("Referral already rewarded"));
                }
                RewardCommitOutcome::LimitReached => {
                    return Ok(RewardOutcome::denied(LIMIT_REACHED_MESSAGE));
                }
                RewardCommitOutcome::Stale => reward_type = RewardType::FreeMonth,
            }
        }

        Err(BillingError::Internal(
            "referral reward could not be committed".to_string(),
        ))
    }

    /// Move a referral forward. Returns false if it was already at or past `to`.
    pub async fn advance(
        &self,
        referred_id: UserId,
        to: ReferralStatus,
    ) -> Result<bool, BillingError> {
        Ok(self.referrals.advance_status(referred_id, to).await?)
    }
}
