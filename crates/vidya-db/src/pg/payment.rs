//! PostgreSQL payment ledger implementation
//!
//! Orders, invoices and transactions. A captured payment is applied in one
//! transaction that starts with the invoice insert: the unique
//! `gateway_payment_id` turns a replayed event into a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use vidya_types::{
    CouponValidation, DailyRevenue, Invoice, PaymentOrder, Subscription, Transaction,
    TransactionExport, TransactionStatus, UserId,
};

use crate::error::DbResult;
use crate::models::{
    convert_all, invoice_columns, order_columns, subscription_columns, transaction_columns,
    CouponValidationRow, DailyRevenueRow, InvoiceRow, PaymentOrderRow, SubscriptionRow,
    TransactionExportRow, TransactionRow,
};
use crate::pg::outbox::insert_item;
use crate::repo::{CaptureOutcome, CaptureRecord, ChargeRecord, PaymentRepository};

/// PostgreSQL payment repository
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    /// Create a new payment repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

struct NewLedgerEntry<'a> {
    user_id: UserId,
    order_id: Option<Uuid>,
    plan_slug: Option<&'a str>,
    gateway_payment_id: &'a str,
    invoice_number: &'a str,
    amount_paise: i64,
    discount_paise: i64,
    coupon_code: Option<&'a str>,
    payment_method: Option<&'a str>,
    currency: &'a str,
    now: DateTime<Utc>,
}

/// Insert invoice and transaction. `None` means the payment id is already recorded.
async fn insert_ledger_entry(
    conn: &mut PgConnection,
    entry: &NewLedgerEntry<'_>,
) -> DbResult<Option<InvoiceRow>> {
    let invoice = sqlx::query_as::<_, InvoiceRow>(concat!(
        "INSERT INTO invoices (id, user_id, order_id, gateway_payment_id, invoice_number, ",
        "amount_paise, currency, created_at) ",
        "VALUES ($1, $2, $3, $4, $5, $6, $7, $8) ",
        "ON CONFLICT (gateway_payment_id) DO NOTHING ",
        "RETURNING ",
        invoice_columns!()
    ))
    .bind(Uuid::new_v4())
    .bind(entry.user_id.0)
    .bind(entry.order_id)
    .bind(entry.gateway_payment_id)
    .bind(entry.invoice_number)
    .bind(entry.amount_paise)
    .bind(entry.currency)
    .bind(entry.now)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(invoice) = invoice else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        INSERT INTO payment_transactions (id, user_id, order_id, plan_slug, amount_paise,
                                          discount_paise, final_amount_paise, coupon_code,
                                          payment_method, status, gateway_payment_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.user_id.0)
    .bind(entry.order_id)
    .bind(entry.plan_slug)
    .bind(entry.amount_paise + entry.discount_paise)
    .bind(entry.discount_paise)
    .bind(entry.amount_paise)
    .bind(entry.coupon_code)
    .bind(entry.payment_method)
    .bind(TransactionStatus::Captured.as_str())
    .bind(entry.gateway_payment_id)
    .bind(entry.now)
    .execute(&mut *conn)
    .await?;

    Ok(Some(invoice))
}

async fn link_invoice(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    subscription_id: Uuid,
) -> DbResult<InvoiceRow> {
    let row = sqlx::query_as::<_, InvoiceRow>(concat!(
        "UPDATE invoices SET subscription_id = $2 WHERE id = $1 RETURNING ",
        invoice_columns!()
    ))
    .bind(invoice_id)
    .bind(subscription_id)
    .fetch_one(conn)
    .await?;

    Ok(row)
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> DbResult<Option<PaymentOrder>> {
        let row = sqlx::query_as::<_, PaymentOrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM payment_orders WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentOrder::try_from).transpose()
    }

    async fn record_capture(&self, capture: CaptureRecord) -> DbResult<CaptureOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = capture.now;

        let entry = NewLedgerEntry {
            user_id: capture.user_id,
            order_id: Some(capture.order_id),
            plan_slug: Some(&capture.plan_slug),
            gateway_payment_id: &capture.gateway_payment_id,
            invoice_number: &capture.invoice_number,
            amount_paise: capture.amount_paise,
            discount_paise: capture.discount_paise,
            coupon_code: capture.coupon_code.as_deref(),
            payment_method: capture.payment_method.as_deref(),
            currency: &capture.currency,
            now,
        };

        let Some(invoice) = insert_ledger_entry(&mut tx, &entry).await? else {
            tx.rollback().await?;
            tracing::debug!(gateway_payment_id = %entry.gateway_payment_id, "payment already recorded");
            return Ok(CaptureOutcome::Duplicate);
        };

        sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = 'paid', gateway_payment_id = $2, paid_at = $3, error_description = NULL
            WHERE id = $1
            "#,
        )
        .bind(capture.order_id)
        .bind(&capture.gateway_payment_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let subscription = sqlx::query_as::<_, SubscriptionRow>(concat!(
            "INSERT INTO subscriptions (id, user_id, plan_id, status, subscription_started_at, ",
            "subscription_expires_at, auto_renew, canceled_at, gateway_customer_id, ",
            "created_at, updated_at) ",
            "VALUES ($1, $2, $3, 'active', $4, $5, TRUE, NULL, $6, $4, $4) ",
            "ON CONFLICT (user_id) DO UPDATE SET ",
            "plan_id = EXCLUDED.plan_id, ",
            "status = 'active', ",
            "subscription_started_at = EXCLUDED.subscription_started_at, ",
            "subscription_expires_at = EXCLUDED.subscription_expires_at, ",
            "auto_renew = TRUE, ",
            "canceled_at = NULL, ",
            "gateway_customer_id = COALESCE(EXCLUDED.gateway_customer_id, subscriptions.gateway_customer_id), ",
            "updated_at = EXCLUDED.updated_at ",
            "RETURNING ",
            subscription_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(capture.user_id.0)
        .bind(capture.plan_id)
        .bind(capture.window.started_at)
        .bind(capture.window.expires_at)
        .bind(&capture.gateway_customer_id)
        .fetch_one(&mut *tx)
        .await?;

        let invoice = link_invoice(&mut tx, invoice.id, subscription.id).await?;

        sqlx::query(
            r#"
            UPDATE referrals
            SET status = 'subscribed'
            WHERE referred_id = $1 AND status IN ('pending', 'signed_up')
            "#,
        )
        .bind(capture.user_id.0)
        .execute(&mut *tx)
        .await?;

        for item in &capture.follow_ups {
            insert_item(&mut tx, item, now).await?;
        }

        tx.commit().await?;

        Ok(CaptureOutcome::Applied {
            subscription: Subscription::try_from(subscription)?,
            invoice: invoice.into(),
        })
    }

    async fn record_recurring_charge(&self, charge: ChargeRecord) -> DbResult<CaptureOutcome> {
        let mut tx = self.pool.begin().await?;
        let now = charge.now;

        let entry = NewLedgerEntry {
            user_id: charge.subscription.user_id,
            order_id: None,
            plan_slug: charge.plan_slug.as_deref(),
            gateway_payment_id: &charge.gateway_payment_id,
            invoice_number: &charge.invoice_number,
            amount_paise: charge.amount_paise,
            discount_paise: 0,
            coupon_code: None,
            payment_method: charge.payment_method.as_deref(),
            currency: &charge.currency,
            now,
        };

        let Some(invoice) = insert_ledger_entry(&mut tx, &entry).await? else {
            tx.rollback().await?;
            tracing::debug!(gateway_payment_id = %entry.gateway_payment_id, "payment already recorded");
            return Ok(CaptureOutcome::Duplicate);
        };

        // Extend from whichever is later so a late charge never shortens access.
        let subscription = if charge.extend {
            sqlx::query_as::<_, SubscriptionRow>(concat!(
                "UPDATE subscriptions SET ",
                "status = 'active', ",
                "subscription_started_at = COALESCE(subscription_started_at, $2), ",
                "subscription_expires_at = GREATEST(COALESCE(subscription_expires_at, $2), $2) ",
                "+ make_interval(days => $3), ",
                "gateway_subscription_id = $4, ",
                "updated_at = $2 ",
                "WHERE id = $1 ",
                "RETURNING ",
                subscription_columns!()
            ))
            .bind(charge.subscription.id.0)
            .bind(now)
            .bind(charge.extend_days)
            .bind(&charge.gateway_subscription_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query_as::<_, SubscriptionRow>(concat!(
                "UPDATE subscriptions SET gateway_subscription_id = $2, updated_at = $3 ",
                "WHERE id = $1 ",
                "RETURNING ",
                subscription_columns!()
            ))
            .bind(charge.subscription.id.0)
            .bind(&charge.gateway_subscription_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?
        };

        let invoice = link_invoice(&mut tx, invoice.id, subscription.id).await?;

        tx.commit().await?;

        Ok(CaptureOutcome::Applied {
            subscription: Subscription::try_from(subscription)?,
            invoice: invoice.into(),
        })
    }

    async fn mark_order_failed(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<&str>,
        error_description: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_orders
            SET status = 'failed',
                gateway_payment_id = COALESCE($2, gateway_payment_id),
                error_description = $3
            WHERE gateway_order_id = $1 AND status <> 'paid'
            "#,
        )
        .bind(gateway_order_id)
        .bind(gateway_payment_id)
        .bind(error_description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_invoices_for_user(&self, user_id: UserId) -> DbResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(concat!(
            "SELECT ",
            invoice_columns!(),
            " FROM invoices WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Invoice::from).collect())
    }

    async fn list_transactions(&self, since: DateTime<Utc>) -> DbResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(concat!(
            "SELECT ",
            transaction_columns!(),
            " FROM payment_transactions WHERE created_at >= $1 ORDER BY created_at"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn export_transactions(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<TransactionExport>> {
        let rows = sqlx::query_as::<_, TransactionExportRow>(
            r#"
            SELECT t.id, t.user_id, t.order_id, t.plan_slug, t.amount_paise, t.discount_paise,
                   t.final_amount_paise, t.coupon_code, t.payment_method, t.status,
                   t.gateway_payment_id, t.created_at,
                   u.email AS user_email, p.name AS plan_name
            FROM payment_transactions t
            LEFT JOIN user_profiles u ON u.id = t.user_id
            LEFT JOIN plans p ON p.slug = t.plan_slug
            WHERE ($1::timestamptz IS NULL OR t.created_at >= $1)
              AND ($2::timestamptz IS NULL OR t.created_at < $2)
            ORDER BY t.created_at DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn daily_revenue(&self, days: i32) -> DbResult<Vec<DailyRevenue>> {
        let rows = sqlx::query_as::<_, DailyRevenueRow>(
            r#"
            SELECT day, revenue_paise, transactions
            FROM revenue_analytics
            WHERE day >= CURRENT_DATE - $1
            ORDER BY day
            "#,
        )
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DailyRevenue::from).collect())
    }

    async fn validate_coupon(
        &self,
        code: &str,
        user_id: UserId,
        plan_slug: &str,
        amount_paise: i64,
    ) -> DbResult<CouponValidation> {
        let row = sqlx::query_as::<_, CouponValidationRow>(
            r#"
            SELECT valid, discount_paise, final_amount_paise, message
            FROM validate_coupon($1, $2, $3, $4)
            "#,
        )
        .bind(code)
        .bind(user_id.0)
        .bind(plan_slug)
        .bind(amount_paise)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}
