//! Transactional outbox consumer
//!
//! Follow-up work is written to the outbox in the same transaction as the
//! write that caused it. [`OutboxProcessor::run_once`] leases due items,
//! dispatches each to the handler registered for its kind and records the
//! result. Delivery is at-least-once, so handlers must be idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use vidya_db::{OutboxItem, OutboxRepository};
use vidya_types::UserId;

use crate::config::OutboxConfig;
use crate::error::BillingError;
use crate::referral::ReferralEngine;

/// Apply the referral reward once the referred user has paid
pub const REFERRAL_REWARD: &str = "referral.reward";

/// Handles one kind of outbox item
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    async fn handle(&self, item: &OutboxItem, now: DateTime<Utc>) -> Result<(), BillingError>;
}

#[derive(Debug, Deserialize)]
struct ReferralRewardPayload {
    referred_id: UserId,
}

/// Runs the referral reward engine for `referral.reward` items
pub struct ReferralRewardHandler {
    engine: ReferralEngine,
}

impl ReferralRewardHandler {
    pub fn new(engine: ReferralEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl OutboxHandler for ReferralRewardHandler {
    async fn handle(&self, item: &OutboxItem, now: DateTime<Utc>) -> Result<(), BillingError> {
        let payload: ReferralRewardPayload = serde_json::from_value(item.payload.clone())
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        // A capped referrer is not retried.
        let outcome = self.engine.apply_reward(payload.referred_id, now).await?;
        if !outcome.success {
            info!(
                referred_id = %payload.referred_id,
                message = outcome.message.as_deref().unwrap_or_default(),
                "referral reward not applied"
            );
        }
        Ok(())
    }
}

/// Counts from one processor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxRunStats {
    pub claimed: usize,
    pub done: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Delay before retrying an item that has been attempted `attempts` times
pub fn backoff(config: &OutboxConfig, attempts: i32) -> StdDuration {
    let exp = attempts.clamp(0, 20) as u32;
    config
        .base_backoff
        .checked_mul(1u32 << exp)
        .unwrap_or(config.max_backoff)
        .min(config.max_backoff)
}

/// Outbox consumer
#[derive(Clone)]
pub struct OutboxProcessor {
    repo: Arc<dyn OutboxRepository>,
    handlers: HashMap<String, Arc<dyn OutboxHandler>>,
    config: OutboxConfig,
}

impl OutboxProcessor {
    pub fn new(repo: Arc<dyn OutboxRepository>, config: OutboxConfig) -> Self {
        Self {
            repo,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register the handler for `kind`
    pub fn with_handler(mut self, kind: impl Into<String>, handler: Arc<dyn OutboxHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Claim and process one batch of due items
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<OutboxRunStats, BillingError> {
        let items = self.repo.claim_due(now, self.config.batch_size).await?;
        let mut stats = OutboxRunStats {
            claimed: items.len(),
            ..Default::default()
        };

        for item in &items {
            let result = match self.handlers.get(&item.kind) {
                Some(handler) => handler.handle(item, now).await,
                None => Err(BillingError::Internal(format!(
                    "no handler for outbox kind {}",
                    item.kind
                ))),
            };

            let label = match result {
                Ok(()) => {
                    self.repo.mark_done(item.id).await?;
                    debug!(id = %item.id, kind = %item.kind, "outbox item done");
                    stats.done += 1;
                    "done"
                }
                Err(e) if item.attempts >= self.config.max_attempts => {
                    error!(id = %item.id, kind = %item.kind, attempts = item.attempts, error = %e, "outbox item failed permanently");
                    self.repo.mark_failed(item.id, &e.to_string()).await?;
                    stats.failed += 1;
                    "failed"
                }
                Err(e) => {
                    let delay = backoff(&self.config, item.attempts);
                    let next = now
                        + Duration::from_std(delay).unwrap_or_else(|_| Duration::hours(1));
                    warn!(id = %item.id, kind = %item.kind, attempts = item.attempts, error = %e, "outbox item will be retried");
                    self.repo.reschedule(item.id, next, &e.to_string()).await?;
                    stats.retried += 1;
                    "retried"
                }
            };
            metrics::counter!("billing_outbox_processed_total", "result" => label).increment(1);
        }

        Ok(stats)
    }
}
