//! PostgreSQL user profile repository implementation

use async_trait::async_trait;
use sqlx::PgPool;

use vidya_types::{UserId, UserProfile};

use crate::error::DbResult;
use crate::models::UserProfileRow;
use crate::repo::UserRepository;

/// PostgreSQL user profile repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> DbResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserProfileRow>(
            r#"
            SELECT id, email, full_name, role, created_at
            FROM user_profiles
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_profiles")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
