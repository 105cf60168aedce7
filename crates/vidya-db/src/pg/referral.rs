//! PostgreSQL referral repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vidya_types::{Referral, ReferralCounts, ReferralStatus, RewardType, Subscription, UserId};

use crate::error::DbResult;
use crate::models::{referral_columns, subscription_columns, ReferralRow, SubscriptionRow};
use crate::repo::{ReferralRepository, RewardCommit, RewardCommitOutcome};

/// PostgreSQL referral repository
#[derive(Clone)]
pub struct PgReferralRepository {
    pool: PgPool,
}

impl PgReferralRepository {
    /// Create a new referral repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferralRepository for PgReferralRepository {
    async fn find_by_referred(&self, referred_id: UserId) -> DbResult<Option<Referral>> {
        let row = sqlx::query_as::<_, ReferralRow>(concat!(
            "SELECT ",
            referral_columns!(),
            " FROM referrals WHERE referred_id = $1"
        ))
        .bind(referred_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Referral::try_from).transpose()
    }

    async fn count_rewarded_since(
        &self,
        referrer_id: UserId,
        since: DateTime<Utc>,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM referrals
            WHERE referrer_id = $1 AND status = 'rewarded' AND reward_applied_at >= $2
            "#,
        )
        .bind(referrer_id.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn advance_status(&self, referred_id: UserId, to: ReferralStatus) -> DbResult<bool> {
        let from: Vec<&'static str> = to.predecessors().iter().map(|s| s.as_str()).collect();
        if from.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE referrals SET status = $2 WHERE referred_id = $1 AND status = ANY($3)",
        )
        .bind(referred_id.0)
        .bind(to.as_str())
        .bind(&from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> DbResult<ReferralCounts> {
        let (total, converted): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('subscribed', 'rewarded'))
            FROM referrals
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ReferralCounts { total, converted })
    }

    async fn commit_reward(&self, reward: RewardCommit) -> DbResult<RewardCommitOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = reward.now;

        // Serializes concurrent rewards for the same referrer.
        let locked: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT id, status FROM referrals WHERE referrer_id = $1 ORDER BY id FOR UPDATE",
        )
        .bind(reward.referrer_id.0)
        .fetch_all(&mut *tx)
        .await?;

        let already = locked
            .iter()
            .any(|(id, status)| *id == reward.referral_id && status == ReferralStatus::Rewarded.as_str());
        if already {
            tx.rollback().await?;
            return Ok(RewardCommitOutcome::AlreadyRewarded);
        }

        let rewarded: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM referrals
            WHERE referrer_id = $1 AND status = 'rewarded' AND reward_applied_at >= $2
            "#,
        )
        .bind(reward.referrer_id.0)
        .bind(reward.month_start)
        .fetch_one(&mut *tx)
        .await?;

        if rewarded >= reward.monthly_cap {
            tx.rollback().await?;
            return Ok(RewardCommitOutcome::LimitReached);
        }

        let subscription = match reward.reward_type {
            RewardType::SubscriptionExtension => {
                sqlx::query_as::<_, SubscriptionRow>(concat!(
                    "UPDATE subscriptions SET ",
                    "subscription_expires_at = GREATEST(subscription_expires_at, $2) ",
                    "+ make_interval(days => $3), ",
                    "updated_at = $2 ",
                    "WHERE user_id = $1 AND status = 'active' ",
                    "RETURNING ",
                    subscription_columns!()
                ))
                .bind(reward.referrer_id.0)
                .bind(now)
                .bind(reward.days)
                .fetch_optional(&mut *tx)
                .await?
            }
            RewardType::FreeMonth => Some(
                sqlx::query_as::<_, SubscriptionRow>(concat!(
                    "INSERT INTO subscriptions (id, user_id, status, subscription_started_at, ",
                    "subscription_expires_at, auto_renew, created_at, updated_at) ",
                    "VALUES ($1, $2, 'active', $3, $4, FALSE, $3, $3) ",
                    "ON CONFLICT (user_id) DO UPDATE SET ",
                    "status = 'active', ",
                    "subscription_started_at = EXCLUDED.subscription_started_at, ",
                    "subscription_expires_at = EXCLUDED.subscription_expires_at, ",
                    "auto_renew = FALSE, ",
                    "canceled_at = NULL, ",
                    "updated_at = EXCLUDED.updated_at ",
                    "RETURNING ",
                    subscription_columns!()
                ))
                .bind(Uuid::new_v4())
                .bind(reward.referrer_id.0)
                .bind(now)
                .bind(now + Duration::days(i64::from(reward.days)))
                .fetch_one(&mut *tx)
                .await?,
            ),
        };

        let Some(subscription) = subscription else {
            tx.rollback().await?;
            tracing::debug!(referrer_id = %reward.referrer_id, "referrer subscription no longer active");
            return Ok(RewardCommitOutcome::Stale);
        };

        sqlx::query(
            r#"
            UPDATE referrals
            SET status = 'rewarded', reward_type = $2, reward_value = $3, reward_applied_at = $4
            WHERE id = $1
            "#,
        )
        .bind(reward.referral_id)
        .bind(reward.reward_type.as_str())
        .bind(reward.days)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, entity_type, entity_id, details, created_at)
            VALUES ($1, 'referral_reward_applied', 'referral', $2, $3, $4)
            "#,
        )
        .bind(reward.referrer_id.0)
        .bind(reward.referral_id.to_string())
        .bind(serde_json::json!({
            "referred_id": reward.referred_id,
            "reward_type": reward.reward_type.as_str(),
            "days": reward.days,
            "new_expires_at": subscription.subscription_expires_at,
        }))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(RewardCommitOutcome::Committed(Subscription::try_from(
            subscription,
        )?))
    }
}
