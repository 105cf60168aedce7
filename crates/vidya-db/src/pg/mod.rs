//! PostgreSQL repository implementations

mod audit;
mod entitlement;
mod outbox;
mod payment;
mod plan;
mod referral;
mod schedule;
mod subscription;
mod user;

use std::sync::Arc;

pub use audit::PgAuditLogRepository;
pub use entitlement::PgEntitlementRepository;
pub use outbox::PgOutboxRepository;
pub use payment::PgPaymentRepository;
pub use plan::PgPlanRepository;
pub use referral::PgReferralRepository;
pub use schedule::PgScheduleRepository;
pub use subscription::PgSubscriptionRepository;
pub use user::PgUserRepository;

use crate::repo::{
    AuditLogRepository, EntitlementRepository, OutboxRepository, PaymentRepository,
    PlanRepository, ReferralRepository, ScheduleRepository, SubscriptionRepository,
    UserRepository,
};
use crate::DbPool;

/// All repositories bundled together behind their traits
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub entitlements: Arc<dyn EntitlementRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub referrals: Arc<dyn ReferralRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
    pub schedule: Arc<dyn ScheduleRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
}

impl Repositories {
    /// Create all PostgreSQL repositories from a database pool
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            subscriptions: Arc::new(PgSubscriptionRepository::new(pool.clone())),
            plans: Arc::new(PgPlanRepository::new(pool.clone())),
            entitlements: Arc::new(PgEntitlementRepository::new(pool.clone())),
            payments: Arc::new(PgPaymentRepository::new(pool.clone())),
            referrals: Arc::new(PgReferralRepository::new(pool.clone())),
            audit: Arc::new(PgAuditLogRepository::new(pool.clone())),
            schedule: Arc::new(PgScheduleRepository::new(pool.clone())),
            outbox: Arc::new(PgOutboxRepository::new(pool)),
        }
    }
}
