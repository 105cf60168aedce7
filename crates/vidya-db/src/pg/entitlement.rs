//! PostgreSQL entitlement ledger implementation

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use vidya_types::{Entitlement, EntitlementDefaults, FeatureSlug, UserId};

use crate::error::DbResult;
use crate::models::{convert_all, entitlement_columns, EntitlementRow};
use crate::repo::EntitlementRepository;

/// PostgreSQL entitlement repository
#[derive(Clone)]
pub struct PgEntitlementRepository {
    pool: PgPool,
}

impl PgEntitlementRepository {
    /// Create a new entitlement repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementRepository for PgEntitlementRepository {
    async fn get_or_create(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        defaults: EntitlementDefaults,
        now: DateTime<Utc>,
    ) -> DbResult<Entitlement> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, EntitlementRow>(concat!(
            "INSERT INTO entitlements (user_id, feature_slug, limit_type, limit_value, ",
            "usage_count, last_reset_at, updated_at) ",
            "VALUES ($1, $2, $3, $4, 0, $5, $5) ",
            "ON CONFLICT (user_id, feature_slug) DO UPDATE SET user_id = entitlements.user_id ",
            "RETURNING ",
            entitlement_columns!()
        ))
        .bind(user_id.0)
        .bind(feature.as_str())
        .bind(defaults.limit_type.as_str())
        .bind(defaults.limit_value)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn reset_if_stale(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Entitlement>> {
        let row = sqlx::query_as::<_, EntitlementRow>(concat!(
            "UPDATE entitlements SET usage_count = 0, last_reset_at = $3, updated_at = $3 ",
            "WHERE user_id = $1 AND feature_slug = $2 AND last_reset_at <= $4 ",
            "RETURNING ",
            entitlement_columns!()
        ))
        .bind(user_id.0)
        .bind(feature.as_str())
        .bind(now)
        .bind(now - Duration::hours(24))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entitlement::try_from).transpose()
    }

    async fn increment(
        &self,
        user_id: UserId,
        feature: &FeatureSlug,
    ) -> DbResult<Option<Entitlement>> {
        let row = sqlx::query_as::<_, EntitlementRow>(concat!(
            "SELECT ",
            entitlement_columns!(),
            " FROM increment_entitlement_usage($1, $2)"
        ))
        .bind(user_id.0)
        .bind(feature.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Entitlement::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> DbResult<Vec<Entitlement>> {
        let rows = sqlx::query_as::<_, EntitlementRow>(concat!(
            "SELECT ",
            entitlement_columns!(),
            " FROM entitlements WHERE user_id = $1 ORDER BY feature_slug"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }
}
