// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Notification dispatcher: batching and delivery status reporting.

use chrono::Utc;
use glucose_monitor::db::{AlertStore, Database, MemoryDb, PushTokenStore};
use glucose_monitor::models::{DeliveryStatus, PushToken};
use glucose_monitor::services::{classify, NotificationDispatcher, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{reference_thresholds, RecordingPush};

const USER: u64 = 11;

fn token(i: usize) -> String {
    format!("ExponentPushToken[device-{}]", i)
}

async fn register_tokens(db: &MemoryDb, count: usize) {
    for i in 0..count {
        db.register_push_token(&PushToken {
            user_id: USER,
            token: token(i),
            platform: None,
            active: true,
            registered_at: Utc::now(),
        })
        .await
        .unwrap();
    }
}

async fn red_alert(db: &MemoryDb) -> String {
    let classification = classify(50.0, Some(&reference_thresholds(USER)));
    db.record_alert(USER, &classification, 50.0).await.unwrap()
}

fn dispatcher(db: &MemoryDb, push: &Arc<RecordingPush>, retry: RetryPolicy) -> NotificationDispatcher {
    let db: Arc<dyn Database> = Arc::new(db.clone());
    NotificationDispatcher::new(db, push.clone(), retry)
}

#[tokio::test]
async fn test_tokens_split_into_provider_batches() {
    let db = MemoryDb::new();
    let push = Arc::new(RecordingPush::with_batch_size(100));
    register_tokens(&db, 250).await;
    let alert_id = red_alert(&db).await;

    let summary = dispatcher(&db, &push, RetryPolicy::none())
        .dispatch(USER, "title", "body", &alert_id)
        .await
        .unwrap();

    assert_eq!(summary.tokens, 250);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.sent, 250);
    assert_eq!(summary.failed, 0);

    let mut sizes: Vec<usize> = push.batches().iter().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);

    let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
    assert_eq!(alert.delivery_status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn test_no_tokens_is_noop() {
    let db = MemoryDb::new();
    let push = Arc::new(RecordingPush::default());
    let alert_id = red_alert(&db).await;

    let summary = dispatcher(&db, &push, RetryPolicy::none())
        .dispatch(USER, "title", "body", &alert_id)
        .await
        .unwrap();

    assert_eq!(summary, Default::default());
    assert!(push.batches().is_empty());

    let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
    assert_eq!(alert.delivery_status, DeliveryStatus::Pending);
}

#[tokio::test]
async fn test_unregistered_device_is_deactivated() {
    let db = MemoryDb::new();
    let push = Arc::new(RecordingPush::default());
    register_tokens(&db, 3).await;
    push.unregister(&token(1));
    let alert_id = red_alert(&db).await;

    let summary = dispatcher(&db, &push, RetryPolicy::none())
        .dispatch(USER, "title", "body", &alert_id)
        .await
        .unwrap();

    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.deactivated, 1);

    let active: Vec<String> = db
        .active_push_tokens(USER)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.token)
        .collect();
    assert_eq!(active.len(), 2);
    assert!(!active.contains(&token(1)));

    let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
    assert_eq!(alert.delivery_status, DeliveryStatus::Error);
    assert!(alert
        .delivery_error
        .unwrap()
        .starts_with("DeviceNotRegistered"));
}

#[tokio::test]
async fn test_batch_failure_marks_error_with_reason() {
    let db = MemoryDb::new();
    let push = Arc::new(RecordingPush::default());
    register_tokens(&db, 2).await;
    push.fail_all_batches();
    let alert_id = red_alert(&db).await;

    let summary = dispatcher(&db, &push, RetryPolicy::none())
        .dispatch(USER, "title", "body", &alert_id)
        .await
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(push.batches().len(), 1, "no retry by default");

    let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
    assert_eq!(alert.delivery_status, DeliveryStatus::Error);
    assert!(alert.delivery_error.unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_one_failed_batch_wins_over_sent_batches() {
    let db = MemoryDb::new();
    let push = Arc::new(RecordingPush::with_batch_size(2));
    register_tokens(&db, 4).await;
    // Only the batch holding device-3 reports an error
    push.unregister(&token(3));
    let alert_id = red_alert(&db).await;

    let summary = dispatcher(&db, &push, RetryPolicy::none())
        .dispatch(USER, "title", "body", &alert_id)
        .await
        .unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.sent, 3);

    let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
    assert_eq!(alert.delivery_status, DeliveryStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_applies_to_sends() {
    let db = MemoryDb::new();
    let push = Arc::new(RecordingPush::default());
    register_tokens(&db, 1).await;
    push.fail_all_batches();
    let alert_id = red_alert(&db).await;

    let retry = RetryPolicy::exponential(3, Duration::from_millis(200));
    dispatcher(&db, &push, retry)
        .dispatch(USER, "title", "body", &alert_id)
        .await
        .unwrap();

    assert_eq!(push.batches().len(), 3);
    let alert = db.get_alert(&alert_id).await.unwrap().unwrap();
    assert_eq!(alert.delivery_status, DeliveryStatus::Error);
}
