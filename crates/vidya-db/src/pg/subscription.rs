//! PostgreSQL subscription repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vidya_types::{Subscription, SubscriptionStatus, UserId};

use crate::error::DbResult;
use crate::models::{convert_all, subscription_columns, SubscriptionRow};
use crate::repo::SubscriptionRepository;

/// PostgreSQL subscription repository
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: PgPool,
}

impl PgSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn find_by_user(&self, user_id: UserId) -> DbResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_gateway_ref(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
    ) -> DbResult<Option<Subscription>> {
        if let Some(sub_id) = subscription_id {
            let row = sqlx::query_as::<_, SubscriptionRow>(concat!(
                "SELECT ",
                subscription_columns!(),
                " FROM subscriptions WHERE gateway_subscription_id = $1"
            ))
            .bind(sub_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                return Ok(Some(row.try_into()?));
            }
        }

        let Some(customer_id) = customer_id else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions WHERE gateway_customer_id = $1 ",
            "ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    async fn list_all(&self) -> DbResult<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "SELECT ",
            subscription_columns!(),
            " FROM subscriptions"
        ))
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn start_trial(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        trial_days: i64,
    ) -> DbResult<Subscription> {
        let inserted = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "INSERT INTO subscriptions (id, user_id, status, trial_started_at, trial_expires_at, ",
            "auto_renew, created_at, updated_at) ",
            "VALUES ($1, $2, 'trial', $3, $4, TRUE, $3, $3) ",
            "ON CONFLICT (user_id) DO NOTHING ",
            "RETURNING ",
            subscription_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(user_id.0)
        .bind(now)
        .bind(now + Duration::days(trial_days))
        .fetch_optional(&self.pool)
        .await?;

        let row = match inserted {
            Some(row) => row,
            None => {
                sqlx::query_as::<_, SubscriptionRow>(concat!(
                    "SELECT ",
                    subscription_columns!(),
                    " FROM subscriptions WHERE user_id = $1"
                ))
                .bind(user_id.0)
                .fetch_one(&self.pool)
                .await?
            }
        };

        row.try_into()
    }

    async fn expire_if_lapsed(
        &self,
        user_id: UserId,
        from: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        // A trial lapses on its trial window, everything else on the paid window.
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'expired', updated_at = $3
            WHERE user_id = $1
              AND status = $2
              AND COALESCE(
                    CASE WHEN status = 'trial' THEN trial_expires_at
                         ELSE subscription_expires_at END,
                    '-infinity'::timestamptz) <= $3
            "#,
        )
        .bind(user_id.0)
        .bind(from.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "UPDATE subscriptions ",
            "SET status = 'canceled', auto_renew = FALSE, canceled_at = $2, updated_at = $2 ",
            "WHERE user_id = $1 AND status = 'active' ",
            "RETURNING ",
            subscription_columns!()
        ))
        .bind(user_id.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    async fn set_status_by_gateway_ref(
        &self,
        subscription_id: Option<&str>,
        customer_id: Option<&str>,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Subscription>> {
        let Some(current) = self
            .find_by_gateway_ref(subscription_id, customer_id)
            .await?
        else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "UPDATE subscriptions ",
            "SET status = $2, updated_at = $3, ",
            "canceled_at = CASE WHEN $2 = 'canceled' THEN COALESCE(canceled_at, $3) ELSE canceled_at END, ",
            "auto_renew = CASE WHEN $2 IN ('canceled', 'expired') THEN FALSE ELSE auto_renew END, ",
            "gateway_subscription_id = COALESCE($4, gateway_subscription_id) ",
            "WHERE id = $1 ",
            "AND ($2 <> 'active' OR subscription_expires_at IS NOT NULL) ",
            "RETURNING ",
            subscription_columns!()
        ))
        .bind(current.id.0)
        .bind(status.as_str())
        .bind(now)
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }
}
