//! Plan catalog lookups
//!
//! Plans are immutable reference data, so lookups go through a small
//! in-process cache in front of the plan repository.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use uuid::Uuid;

use vidya_db::PlanRepository;
use vidya_types::Plan;

use crate::error::BillingError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PlanKey {
    Id(Uuid),
    Slug(String),
}

/// Cached plan catalog
#[derive(Clone)]
pub struct PlanCatalog {
    repo: Arc<dyn PlanRepository>,
    cache: Cache<PlanKey, Plan>,
}

impl PlanCatalog {
    pub fn new(repo: Arc<dyn PlanRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: Cache::builder().max_capacity(64).time_to_live(ttl).build(),
        }
    }

    /// Plan by id, `PlanNotFound` when absent
    pub async fn by_id(&self, id: Uuid) -> Result<Plan, BillingError> {
        let key = PlanKey::Id(id);
        if let Some(plan) = self.cache.get(&key).await {
            return Ok(plan);
        }

        let plan = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(BillingError::PlanNotFound)?;
        self.remember(&plan).await;
        Ok(plan)
    }

    /// Plan by slug, `PlanNotFound` when absent
    pub async fn by_slug(&self, slug: &str) -> Result<Plan, BillingError> {
        let key = PlanKey::Slug(slug.to_string());
        if let Some(plan) = self.cache.get(&key).await {
            return Ok(plan);
        }

        let plan = self
            .repo
            .find_by_slug(slug)
            .await?
            .ok_or(BillingError::PlanNotFound)?;
        self.remember(&plan).await;
        Ok(plan)
    }

    async fn remember(&self, plan: &Plan) {
        self.cache.insert(PlanKey::Id(plan.id), plan.clone()).await;
        self.cache
            .insert(PlanKey::Slug(plan.slug.clone()), plan.clone())
            .await;
    }
}
