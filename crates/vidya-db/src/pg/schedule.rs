//! PostgreSQL study schedule repository implementation

use async_trait::async_trait;
use sqlx::PgPool;

use vidya_types::{ScheduleTask, UserId};

use crate::error::DbResult;
use crate::models::ScheduleTaskRow;
use crate::repo::ScheduleRepository;

/// PostgreSQL schedule repository
#[derive(Clone)]
pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn list_for_user(&self, user_id: UserId) -> DbResult<Vec<ScheduleTask>> {
        let rows = sqlx::query_as::<_, ScheduleTaskRow>(
            r#"
            SELECT id, user_id, title, description, subject, scheduled_date, start_time,
                   duration_minutes, completed
            FROM schedule_tasks
            WHERE user_id = $1
            ORDER BY scheduled_date, start_time NULLS LAST
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScheduleTask::from).collect())
    }
}
