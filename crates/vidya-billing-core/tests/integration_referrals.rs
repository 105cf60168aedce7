//! Referral reward and outbox integration tests

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::*;
use vidya_billing_core::webhook::sign;
use vidya_billing_core::{BillingConfig, BillingService, OutboxConfig, REFERRAL_REWARD};
use vidya_db::{NewOutboxItem, OutboxRepository, OutboxStatus};
use vidya_types::{Referral, ReferralStatus, RewardType, SubscriptionStatus, UserId};

fn rewarded(referrer: UserId, at: chrono::DateTime<Utc>) -> Referral {
    Referral {
        reward_type: Some(RewardType::SubscriptionExtension),
        reward_value: Some(30),
        reward_applied_at: Some(at),
        ..referral(referrer, UserId::new(), ReferralStatus::Rewarded)
    }
}

// ============================================================================
// Reward engine
// ============================================================================

#[tokio::test]
async fn test_active_referrer_gets_extension() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    let referred = UserId::new();
    store.insert_subscription(active_subscription(referrer, MONTHLY, now(), 10));
    store.insert_referral(referral(referrer, referred, ReferralStatus::Subscribed));

    let outcome = billing.apply_referral_reward(referred, now()).await.unwrap();

    assert!(outcome.success);
    let reward = outcome.reward.unwrap();
    assert_eq!(reward.reward_type, RewardType::SubscriptionExtension);
    assert_eq!(reward.days, 30);
    assert_eq!(reward.referrer_id, referrer);
    assert_eq!(reward.new_expires_at, now() + Duration::days(40));

    let row = store.referral(referred).unwrap();
    assert_eq!(row.status, ReferralStatus::Rewarded);
    assert_eq!(row.reward_applied_at, Some(now()));
    assert_eq!(
        store.subscription(referrer).unwrap().subscription_expires_at,
        Some(now() + Duration::days(40))
    );
    assert_eq!(store.audit_actions(), ["referral_reward_applied"]);
}

#[tokio::test]
async fn test_inactive_referrer_gets_free_month() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    let referred = UserId::new();
    store.insert_subscription(blank_subscription(referrer, SubscriptionStatus::Expired, now()));
    store.insert_referral(referral(referrer, referred, ReferralStatus::Subscribed));

    let outcome = billing.apply_referral_reward(referred, now()).await.unwrap();

    let reward = outcome.reward.unwrap();
    assert_eq!(reward.reward_type, RewardType::FreeMonth);
    let sub = store.subscription(referrer).unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.subscription_started_at, Some(now()));
    assert_eq!(sub.subscription_expires_at, Some(now() + Duration::days(30)));
}

#[tokio::test]
async fn test_monthly_cap_denies_without_writes() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    store.insert_subscription(active_subscription(referrer, MONTHLY, now(), 10));
    for day in 1..=10 {
        store.insert_referral(rewarded(referrer, now() - Duration::days(day)));
    }
    let referred = UserId::new();
    store.insert_referral(referral(referrer, referred, ReferralStatus::Subscribed));
    let before = store.fingerprint();

    let outcome = billing.apply_referral_reward(referred, now()).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.reward.is_none());
    assert_eq!(outcome.message.as_deref(), Some("Monthly reward limit reached"));
    assert_eq!(store.fingerprint(), before);
}

#[tokio::test]
async fn test_cap_counts_current_month_only() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    let last_month = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
    for _ in 0..10 {
        store.insert_referral(rewarded(referrer, last_month));
    }
    let referred = UserId::new();
    store.insert_referral(referral(referrer, referred, ReferralStatus::Subscribed));

    let outcome = billing.apply_referral_reward(referred, now()).await.unwrap();

    assert!(outcome.success);
    assert!(outcome.reward.is_some());
}

#[tokio::test]
async fn test_already_rewarded_and_missing_are_skipped() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    let done = rewarded(referrer, now() - Duration::days(1));
    let referred = done.referred_id;
    store.insert_referral(done);
    let before = store.fingerprint();

    let again = billing.apply_referral_reward(referred, now()).await.unwrap();
    assert!(again.success);
    assert!(again.reward.is_none());
    assert_eq!(again.message.as_deref(), Some("Referral already rewarded"));

    let missing = billing
        .apply_referral_reward(UserId::new(), now())
        .await
        .unwrap();
    assert!(missing.success);
    assert_eq!(missing.message.as_deref(), Some("No referral found"));

    assert_eq!(store.fingerprint(), before);
}

#[tokio::test]
async fn test_status_only_moves_forward() {
    let (billing, store) = billing();
    let referred = UserId::new();
    store.insert_referral(referral(UserId::new(), referred, ReferralStatus::Pending));

    assert!(billing
        .advance_referral(referred, ReferralStatus::SignedUp)
        .await
        .unwrap());
    assert!(!billing
        .advance_referral(referred, ReferralStatus::SignedUp)
        .await
        .unwrap());
    assert!(!billing
        .advance_referral(referred, ReferralStatus::Pending)
        .await
        .unwrap());
    assert_eq!(store.referral(referred).unwrap().status, ReferralStatus::SignedUp);
}

// ============================================================================
// Outbox
// ============================================================================

#[tokio::test]
async fn test_capture_reward_runs_through_outbox() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    let referred = UserId::new();
    store.insert_subscription(active_subscription(referrer, MONTHLY, now(), 3));
    store.insert_referral(referral(referrer, referred, ReferralStatus::SignedUp));
    store.insert_order(order(referred, MONTHLY, "order_ref", 59_900));

    let body = serde_json::json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {"id": "pay_ref", "order_id": "order_ref", "amount": 59900}}}
    })
    .to_string()
    .into_bytes();
    let sig = sign(&body, WEBHOOK_SECRET).unwrap();
    billing.handle_webhook(&body, Some(&sig), now()).await.unwrap();

    // Reward is deferred until the outbox runs.
    assert_eq!(store.referral(referred).unwrap().status, ReferralStatus::Subscribed);

    let stats = billing.run_outbox(now() + Duration::seconds(1)).await.unwrap();
    assert_eq!(stats.claimed, 1);
    assert_eq!(stats.done, 1);

    assert_eq!(store.referral(referred).unwrap().status, ReferralStatus::Rewarded);
    assert_eq!(
        store.subscription(referrer).unwrap().subscription_expires_at,
        Some(now() + Duration::days(33))
    );
    assert_eq!(store.outbox_items()[0].status, OutboxStatus::Done);

    let idle = billing.run_outbox(now() + Duration::minutes(10)).await.unwrap();
    assert_eq!(idle.claimed, 0);
}

#[tokio::test]
async fn test_capped_reward_item_is_not_retried() {
    let (billing, store) = billing();
    let referrer = UserId::new();
    for day in 1..=10 {
        store.insert_referral(rewarded(referrer, now() - Duration::days(day)));
    }
    let referred = UserId::new();
    store.insert_referral(referral(referrer, referred, ReferralStatus::Subscribed));
    let start = Utc::now();
    OutboxRepository::enqueue(
        &store,
        NewOutboxItem::new(
            REFERRAL_REWARD,
            serde_json::json!({ "referred_id": referred }),
        ),
    )
    .await
    .unwrap();

    let stats = billing.run_outbox(start + Duration::seconds(1)).await.unwrap();

    assert_eq!(stats.done, 1);
    assert_eq!(stats.retried, 0);
    assert_eq!(store.referral(referred).unwrap().status, ReferralStatus::Subscribed);
}

#[tokio::test]
async fn test_unknown_kind_retries_then_fails() {
    let store = MockStore::with_catalog();
    let config = BillingConfig::new(KEY_SECRET).with_outbox(OutboxConfig {
        max_attempts: 2,
        ..OutboxConfig::default()
    });
    let billing = BillingService::new(store.repositories(), config);
    let start = Utc::now();
    OutboxRepository::enqueue(
        &store,
        NewOutboxItem::new("email.welcome", serde_json::json!({})),
    )
    .await
    .unwrap();

    let first = billing.run_outbox(start + Duration::seconds(1)).await.unwrap();
    assert_eq!(first.retried, 1);
    let item = &store.outbox_items()[0];
    assert_eq!(item.status, OutboxStatus::Pending);
    assert_eq!(item.attempts, 1);
    assert!(item.last_error.as_deref().unwrap().contains("email.welcome"));

    // Not due until the backoff has elapsed.
    let early = billing.run_outbox(start + Duration::seconds(30)).await.unwrap();
    assert_eq!(early.claimed, 0);

    let second = billing.run_outbox(start + Duration::minutes(2)).await.unwrap();
    assert_eq!(second.failed, 1);
    assert_eq!(store.outbox_items()[0].status, OutboxStatus::Failed);
}
