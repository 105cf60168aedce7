//! Revenue aggregator
//!
//! Metrics are pure functions of a [`RevenueSnapshot`] and are re-derived on
//! every request. Money is summed in paise and converted to rupees, rounded
//! to two decimals, only when building [`RevenueMetrics`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{instrument, warn};
use uuid::Uuid;

use vidya_db::{
    PaymentRepository, PlanRepository, ReferralRepository, SubscriptionRepository, UserRepository,
};
use vidya_types::{
    paise_to_rupees, round2, DailyRevenue, Plan, ReferralCounts, Subscription, SubscriptionStatus,
    Transaction, TransactionStatus,
};

const WINDOW_DAYS: i64 = 30;
const TREND_MONTHS: u32 = 12;

/// Everything the metrics are derived from
#[derive(Debug, Clone, Default)]
pub struct RevenueSnapshot {
    pub subscriptions: Vec<Subscription>,
    pub plans: Vec<Plan>,
    /// Captured, failed and refunded charges; only captured ones count as revenue
    pub transactions: Vec<Transaction>,
    pub referrals: ReferralCounts,
    pub total_users: i64,
}

/// MRR of one calendar month in the trend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyMrr {
    /// `YYYY-MM`
    pub month: String,
    /// Rupees
    pub mrr: f64,
}

/// Dashboard metrics. Money in rupees, rates as fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueMetrics {
    pub mrr: f64,
    pub arr: f64,
    pub churn_rate: f64,
    pub trial_conversion_rate: f64,
    pub ltv: f64,
    pub mrr_trend: Vec<MonthlyMrr>,
    pub k_factor: f64,
    pub active_subscriptions: i64,
}

fn plan_index(plans: &[Plan]) -> HashMap<Uuid, &Plan> {
    plans.iter().map(|p| (p.id, p)).collect()
}

/// MRR in paise over subscriptions with status `active`. Unknown plans contribute 0.
pub fn mrr_paise<'a>(
    subscriptions: impl IntoIterator<Item = &'a Subscription>,
    plans: &[Plan],
) -> f64 {
    let index = plan_index(plans);
    subscriptions
        .into_iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .filter_map(|s| s.plan_id.and_then(|id| index.get(&id)))
        .map(|p| p.monthly_rate_paise())
        .sum()
}

/// Cancellations in the trailing 30 days over active plus those cancellations
pub fn churn_rate(subscriptions: &[Subscription], now: DateTime<Utc>) -> f64 {
    let window_start = now - Duration::days(WINDOW_DAYS);
    let active = subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
        .count();
    let canceled = subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Canceled)
        .filter(|s| s.canceled_at.is_some_and(|at| at >= window_start))
        .count();

    let denominator = active + canceled;
    if denominator == 0 {
        0.0
    } else {
        canceled as f64 / denominator as f64
    }
}

/// Trials started in the trailing 30 days that later started a paid period
pub fn trial_conversion_rate(subscriptions: &[Subscription], now: DateTime<Utc>) -> f64 {
    let window_start = now - Duration::days(WINDOW_DAYS);
    let (started, converted) = subscriptions
        .iter()
        .filter_map(|s| s.trial_started_at.map(|t| (s, t)))
        .filter(|(_, trial_start)| *trial_start >= window_start)
        .fold((0usize, 0usize), |(started, converted), (s, trial_start)| {
            let paid = s
                .subscription_started_at
                .is_some_and(|paid_at| paid_at >= trial_start);
            (started + 1, converted + usize::from(paid))
        });

    if started == 0 {
        0.0
    } else {
        converted as f64 / started as f64
    }
}

/// Captured revenue per distinct paying user, in paise
pub fn ltv_paise(transactions: &[Transaction]) -> f64 {
    let captured: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Captured)
        .collect();
    let payers: HashSet<_> = captured.iter().map(|t| t.user_id).collect();
    if payers.is_empty() {
        return 0.0;
    }

    let total: i64 = captured.iter().map(|t| t.final_amount_paise).sum();
    total as f64 / payers.len() as f64
}

/// First instant of the month `months_back` months before `now`'s month
fn month_start_back(now: DateTime<Utc>, months_back: u32) -> Option<DateTime<Utc>> {
    let index = now.year() * 12 + now.month0() as i32 - months_back as i32;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// MRR per month for the trailing 12 months, oldest first.
///
/// Each month only counts active subscriptions whose paid period started in
/// that month; a subscription is never carried into later months.
pub fn mrr_trend(
    subscriptions: &[Subscription],
    plans: &[Plan],
    now: DateTime<Utc>,
) -> Vec<MonthlyMrr> {
    (0..TREND_MONTHS)
        .rev()
        .filter_map(|back| {
            let start = month_start_back(now, back)?;
            let end = match back {
                0 => DateTime::<Utc>::MAX_UTC,
                _ => month_start_back(now, back - 1)?,
            };
            Some((start, end))
        })
        .map(|(start, end)| {
            let in_month = subscriptions.iter().filter(|s| {
                s.subscription_started_at
                    .is_some_and(|at| at >= start && at < end)
            });
            MonthlyMrr {
                month: start.format("%Y-%m").to_string(),
                mrr: paise_to_rupees(mrr_paise(in_month, plans)),
            }
        })
        .collect()
}

/// Viral coefficient. Each factor is rounded before multiplying.
pub fn k_factor(counts: ReferralCounts, total_users: i64) -> f64 {
    if counts.total == 0 || total_users == 0 {
        return 0.0;
    }
    let avg_referrals = round2(counts.total as f64 / total_users as f64);
    let conversion_rate = round2(counts.converted as f64 / counts.total as f64 * 100.0);
    round2(avg_referrals * conversion_rate / 100.0)
}

impl RevenueSnapshot {
    /// Derive every metric at `now`
    pub fn metrics(&self, now: DateTime<Utc>) -> RevenueMetrics {
        let mrr = mrr_paise(&self.subscriptions, &self.plans);

        RevenueMetrics {
            mrr: paise_to_rupees(mrr),
            arr: paise_to_rupees(mrr * 12.0),
            churn_rate: churn_rate(&self.subscriptions, now),
            trial_conversion_rate: trial_conversion_rate(&self.subscriptions, now),
            ltv: paise_to_rupees(ltv_paise(&self.transactions)),
            mrr_trend: mrr_trend(&self.subscriptions, &self.plans, now),
            k_factor: k_factor(self.referrals, self.total_users),
            active_subscriptions: self
                .subscriptions
                .iter()
                .filter(|s| s.status == SubscriptionStatus::Active)
                .count() as i64,
        }
    }
}

/// Loads revenue snapshots from the store
#[derive(Clone)]
pub struct RevenueAggregator {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    payments: Arc<dyn PaymentRepository>,
    referrals: Arc<dyn ReferralRepository>,
    users: Arc<dyn UserRepository>,
}

/// Log a failed load and fall back to the empty value
fn or_default<T: Default, E: std::fmt::Display>(what: &str, result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| {
        warn!(error = %e, component = what, "revenue input unavailable; using empty");
        T::default()
    })
}

impl RevenueAggregator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        payments: Arc<dyn PaymentRepository>,
        referrals: Arc<dyn ReferralRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            payments,
            referrals,
            users,
        }
    }

    /// Load a snapshot. A failing component degrades to empty instead of failing the whole load.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> RevenueSnapshot {
        let (subscriptions, plans, transactions, referrals, total_users) = (
            self.subscriptions.list_all().await,
            self.plans.list().await,
            self.payments.list_transactions(DateTime::UNIX_EPOCH).await,
            self.referrals.counts().await,
            self.users.count().await,
        );

        RevenueSnapshot {
            subscriptions: or_default("subscriptions", subscriptions),
            plans: or_default("plans", plans),
            transactions: or_default("transactions", transactions),
            referrals: or_default("referrals", referrals),
            total_users: or_default("users", total_users),
        }
    }

    /// Metrics at `now` from a fresh snapshot
    pub async fn metrics(&self, now: DateTime<Utc>) -> RevenueMetrics {
        self.snapshot().await.metrics(now)
    }

    /// Per-day captured revenue for the last `days` days; empty on failure
    pub async fn daily_revenue(&self, days: i32) -> Vec<DailyRevenue> {
        or_default("daily_revenue", self.payments.daily_revenue(days).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vidya_types::{SubscriptionId, UserId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn plan(slug: &str, price_paise: i64, duration_days: i32) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_string(),
            price_paise,
            duration_days,
            features: serde_json::json!({}),
            is_active: true,
        }
    }

    fn catalog() -> Vec<Plan> {
        vec![
            plan("monthly", 59_900, 30),
            plan("quarterly", 149_900, 90),
            plan("half-yearly", 269_900, 180),
            plan("annual", 499_900, 365),
        ]
    }

    fn subscription(status: SubscriptionStatus, plan_id: Option<Uuid>) -> Subscription {
        Subscription {
            id: SubscriptionId::new(),
            user_id: UserId::new(),
            plan_id,
            status,
            trial_started_at: None,
            trial_expires_at: None,
            subscription_started_at: Some(now() - Duration::days(3)),
            subscription_expires_at: Some(now() + Duration::days(27)),
            auto_renew: true,
            canceled_at: None,
            gateway_subscription_id: None,
            gateway_customer_id: None,
            created_at: now() - Duration::days(3),
            updated_at: now() - Duration::days(3),
        }
    }

    fn captured(user_id: UserId, final_amount_paise: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            order_id: None,
            plan_slug: None,
            amount_paise: final_amount_paise,
            discount_paise: 0,
            final_amount_paise,
            coupon_code: None,
            payment_method: None,
            status: TransactionStatus::Captured,
            gateway_payment_id: Uuid::new_v4().to_string(),
            created_at: now(),
        }
    }

    // ==========================================================================
    // MRR
    // ==========================================================================

    #[test]
    fn test_mrr_normalizes_every_tier() {
        let plans = catalog();
        let subs: Vec<_> = plans
            .iter()
            .map(|p| subscription(SubscriptionStatus::Active, Some(p.id)))
            .collect();

        let metrics = RevenueSnapshot {
            subscriptions: subs,
            plans,
            ..Default::default()
        }
        .metrics(now());

        assert_eq!(metrics.mrr, 1965.08);
        assert_eq!(metrics.arr, 23581.0);
        assert_eq!(metrics.active_subscriptions, 4);
    }

    #[test]
    fn test_mrr_ignores_non_active_and_unknown_plans() {
        let plans = catalog();
        let subs = vec![
            subscription(SubscriptionStatus::Trial, Some(plans[0].id)),
            subscription(SubscriptionStatus::Canceled, Some(plans[0].id)),
            subscription(SubscriptionStatus::Active, Some(Uuid::new_v4())),
            subscription(SubscriptionStatus::Active, None),
        ];
        assert_eq!(mrr_paise(&subs, &plans), 0.0);
    }

    #[test]
    fn test_mrr_skips_slugs_outside_the_four_tiers() {
        let plans = vec![plan("yearly", 120_000, 365), plan("half_yearly", 60_000, 180)];
        let subs: Vec<_> = plans
            .iter()
            .map(|p| subscription(SubscriptionStatus::Active, Some(p.id)))
            .collect();

        let metrics = RevenueSnapshot {
            subscriptions: subs,
            plans,
            ..Default::default()
        }
        .metrics(now());

        assert_eq!(metrics.mrr, 0.0);
        assert_eq!(metrics.arr, 0.0);
        assert_eq!(metrics.active_subscriptions, 2);
    }

    // ==========================================================================
    // Rates
    // ==========================================================================

    #[test]
    fn test_churn_counts_only_recent_cancellations() {
        let mut recent = subscription(SubscriptionStatus::Canceled, None);
        recent.canceled_at = Some(now() - Duration::days(5));
        let mut old = subscription(SubscriptionStatus::Canceled, None);
        old.canceled_at = Some(now() - Duration::days(45));
        let subs = vec![
            subscription(SubscriptionStatus::Active, None),
            subscription(SubscriptionStatus::Active, None),
            subscription(SubscriptionStatus::Active, None),
            recent,
            old,
        ];

        assert_eq!(churn_rate(&subs, now()), 0.25);
    }

    #[test]
    fn test_rates_are_zero_without_population() {
        assert_eq!(churn_rate(&[], now()), 0.0);
        assert_eq!(trial_conversion_rate(&[], now()), 0.0);
        assert_eq!(ltv_paise(&[]), 0.0);
    }

    #[test]
    fn test_trial_conversion() {
        let mut converted = subscription(SubscriptionStatus::Active, None);
        converted.trial_started_at = Some(now() - Duration::days(10));
        let mut pending = subscription(SubscriptionStatus::Trial, None);
        pending.trial_started_at = Some(now() - Duration::days(2));
        pending.subscription_started_at = None;
        let mut outside_window = subscription(SubscriptionStatus::Active, None);
        outside_window.trial_started_at = Some(now() - Duration::days(60));

        let subs = vec![converted, pending, outside_window];
        assert_eq!(trial_conversion_rate(&subs, now()), 0.5);
    }

    #[test]
    fn test_ltv_per_distinct_payer() {
        let a = UserId::new();
        let b = UserId::new();
        let mut failed = captured(b, 100_000);
        failed.status = TransactionStatus::Failed;
        let txs = vec![captured(a, 59_900), captured(a, 59_900), captured(b, 149_900), failed];

        let metrics = RevenueSnapshot {
            transactions: txs,
            ..Default::default()
        }
        .metrics(now());
        assert_eq!(metrics.ltv, 1348.5);
    }

    // ==========================================================================
    // Trend and K-factor
    // ==========================================================================

    #[test]
    fn test_trend_attributes_to_start_month_only() {
        let plans = catalog();
        let mut march = subscription(SubscriptionStatus::Active, Some(plans[0].id));
        march.subscription_started_at = Some(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        let june = subscription(SubscriptionStatus::Active, Some(plans[0].id));

        let trend = mrr_trend(&[march, june], &plans, now());

        assert_eq!(trend.len(), 12);
        assert_eq!(trend[0].month, "2023-07");
        assert_eq!(trend[11].month, "2024-06");
        let by_month: HashMap<_, _> = trend.iter().map(|m| (m.month.as_str(), m.mrr)).collect();
        assert_eq!(by_month["2024-03"], 599.0);
        assert_eq!(by_month["2024-04"], 0.0);
        assert_eq!(by_month["2024-06"], 599.0);
    }

    #[test]
    fn test_k_factor_rounds_each_factor() {
        // 7/3 -> 2.33, 2/7*100 -> 28.57, 2.33 * 0.2857 = 0.6657 -> 0.67
        let counts = ReferralCounts {
            total: 7,
            converted: 2,
        };
        assert_eq!(k_factor(counts, 3), 0.67);
        assert_eq!(k_factor(ReferralCounts::default(), 3), 0.0);
        assert_eq!(k_factor(counts, 0), 0.0);
    }
}
