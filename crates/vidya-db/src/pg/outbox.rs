//! PostgreSQL outbox repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::{convert_all, outbox_columns, OutboxRow};
use crate::repo::{NewOutboxItem, OutboxItem, OutboxRepository, OutboxStatus};

/// How long a claimed item stays invisible to other consumers
const LEASE: Duration = Duration::minutes(5);

/// PostgreSQL outbox repository
#[derive(Clone)]
pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    /// Create a new outbox repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert an item on an existing connection, typically inside a caller's transaction
pub(crate) async fn insert_item(
    conn: &mut PgConnection,
    item: &NewOutboxItem,
    now: DateTime<Utc>,
) -> DbResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO outbox (id, kind, payload, status, attempts, next_attempt_at, created_at)
        VALUES ($1, $2, $3, 'pending', 0, $4, $4)
        "#,
    )
    .bind(id)
    .bind(&item.kind)
    .bind(&item.payload)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(id)
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn enqueue(&self, item: NewOutboxItem) -> DbResult<Uuid> {
        let mut conn = self.pool.acquire().await?;
        insert_item(&mut conn, &item, Utc::now()).await
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<OutboxItem>> {
        let rows = sqlx::query_as::<_, OutboxRow>(concat!(
            "UPDATE outbox SET attempts = attempts + 1, locked_until = $2 ",
            "WHERE id IN (",
            "  SELECT id FROM outbox ",
            "  WHERE status = 'pending' AND next_attempt_at <= $1 ",
            "    AND (locked_until IS NULL OR locked_until <= $1) ",
            "  ORDER BY next_attempt_at ",
            "  LIMIT $3 ",
            "  FOR UPDATE SKIP LOCKED",
            ") RETURNING ",
            outbox_columns!()
        ))
        .bind(now)
        .bind(now + LEASE)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn mark_done(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE outbox SET status = $2, locked_until = NULL WHERE id = $1")
            .bind(id)
            .bind(OutboxStatus::Done.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET next_attempt_at = $2, last_error = $3, locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE outbox SET status = $2, last_error = $3, locked_until = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(OutboxStatus::Failed.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
