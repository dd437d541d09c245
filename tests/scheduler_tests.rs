// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Monitoring scheduler behavior on paused tokio time.

use chrono::{Duration as ChronoDuration, Utc};
use glucose_monitor::db::{ReadingStore, ThresholdStore};
use glucose_monitor::services::{CycleOutcome, SourceError, StartOutcome, TickReport};
use std::time::Duration;

mod common;
use common::{create_test_app, reference_thresholds};

const USER: u64 = 42;

#[tokio::test(start_paused = true)]
async fn test_start_twice_keeps_one_session() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;
    app.source.push_value(100.0, Utc::now());

    let (session, first_cycle) = match scheduler.start(USER, None).await {
        StartOutcome::Started {
            session,
            first_cycle,
        } => (session, first_cycle),
        other => panic!("expected a new session, got {:?}", other),
    };
    assert_eq!(session.interval, Duration::from_millis(300_000));
    assert!(matches!(
        first_cycle,
        TickReport::Completed(CycleOutcome::Processed { .. })
    ));

    let second = scheduler.start(USER, Some(Duration::from_secs(10))).await;
    match second {
        StartOutcome::AlreadyRunning(existing) => {
            // The original interval is kept
            assert_eq!(existing.interval, Duration::from_millis(300_000));
            assert_eq!(existing.started_at, session.started_at);
        }
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }

    assert_eq!(scheduler.active_sessions().len(), 1);
    assert_eq!(app.source.calls(), 1, "second start must not poll");

    scheduler.shutdown().await;
    assert!(!scheduler.is_running(USER));
}

#[tokio::test(start_paused = true)]
async fn test_stop_idle_user_is_noop() {
    let app = create_test_app();

    assert!(!app.state.scheduler.stop(USER));
    assert!(!app.state.scheduler.is_running(USER));
    assert!(app.state.scheduler.session(USER).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ticks_follow_interval_until_stopped() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;

    scheduler.start(USER, Some(Duration::from_secs(10))).await;
    assert_eq!(app.source.calls(), 1);

    // Ticks at +10s and +20s
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(app.source.calls(), 3);

    assert!(scheduler.stop(USER));
    assert!(!scheduler.is_running(USER));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(app.source.calls(), 3, "no ticks after stop");

    assert!(!scheduler.stop(USER), "second stop is a no-op");
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_keeps_session_running() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;

    app.source
        .push_result(Err(SourceError::Unavailable("sensor offline".to_string())));
    app.source.push_value(120.0, Utc::now());

    match scheduler.start(USER, Some(Duration::from_secs(10))).await {
        StartOutcome::Started { first_cycle, .. } => match first_cycle {
            TickReport::Failed { reason } => assert!(reason.contains("sensor offline")),
            other => panic!("expected a failed first cycle, got {:?}", other),
        },
        other => panic!("expected a new session, got {:?}", other),
    }
    assert!(scheduler.is_running(USER));

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(app.source.calls(), 2);
    assert_eq!(app.db.reading_count(), 1, "next tick recovered");

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_same_timestamp_stored_once() {
    let app = create_test_app();
    app.db
        .create_thresholds(&reference_thresholds(USER))
        .await
        .unwrap();

    let at = Utc::now() - ChronoDuration::minutes(1);
    app.source.push_value(143.0, at);
    app.source.push_value(143.0, at);

    app.state
        .scheduler
        .start(USER, Some(Duration::from_secs(10)))
        .await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    assert_eq!(app.source.calls(), 2);
    assert_eq!(app.db.reading_count(), 1);
    assert_eq!(app.db.alert_count(), 1, "duplicate raises no alert");

    app.state.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polled_value_round_trips() {
    let app = create_test_app();
    app.source.push_value(123.4, Utc::now());

    app.state.scheduler.start(USER, None).await;

    let latest = app.db.latest_reading(USER).await.unwrap().unwrap();
    assert!((latest.value - 123.4).abs() < f64::EPSILON);
    assert_eq!(latest.source, "scripted");
    assert_eq!(latest.trend, Some(3));

    app.state.scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_users_are_independent() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;

    scheduler.start(1, Some(Duration::from_secs(10))).await;
    scheduler.start(2, Some(Duration::from_secs(30))).await;
    assert_eq!(scheduler.active_sessions().len(), 2);

    assert!(scheduler.stop(1));
    assert!(scheduler.is_running(2));
    assert_eq!(
        scheduler.session(2).unwrap().interval,
        Duration::from_secs(30)
    );

    scheduler.shutdown().await;
    assert!(scheduler.active_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restart_waits_for_stopped_cycle() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;
    app.source.set_delay(Duration::from_secs(5));

    // First cycle 0s..5s, next tick at 15s
    scheduler.start(USER, Some(Duration::from_secs(10))).await;
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(app.source.in_flight(), 1, "tick should be in progress");

    assert!(scheduler.stop(USER));
    match scheduler.start(USER, Some(Duration::from_secs(10))).await {
        StartOutcome::Started { first_cycle, .. } => {
            assert_eq!(first_cycle, TickReport::Completed(CycleOutcome::NoReading));
        }
        other => panic!("expected a new session, got {:?}", other),
    }

    assert_eq!(app.source.calls(), 3);
    assert_eq!(
        app.source.max_in_flight(),
        1,
        "cycles for the same user ran at the same time"
    );

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ticks_missed_during_slow_cycle_are_skipped() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;
    let base = Utc::now() - ChronoDuration::minutes(10);

    app.source.push_value(110.0, base);
    // Tick at 10s runs until 45s, missing the 20s, 30s and 40s ticks
    app.source
        .push_slow_value(115.0, base + ChronoDuration::minutes(1), Duration::from_secs(35));

    scheduler.start(USER, Some(Duration::from_secs(10))).await;

    // One catch-up tick at 45s, then back on the 10s grid at 50s
    tokio::time::sleep(Duration::from_secs(48)).await;
    assert_eq!(app.source.calls(), 3);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(app.source.calls(), 4);

    assert_eq!(app.source.max_in_flight(), 1);
    assert_eq!(app.db.reading_count(), 2);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_in_flight_cycle_finish() {
    let app = create_test_app();
    let scheduler = &app.state.scheduler;
    let base = Utc::now() - ChronoDuration::minutes(10);

    app.source.push_value(110.0, base);
    app.source
        .push_slow_value(130.0, base + ChronoDuration::minutes(1), Duration::from_secs(5));

    scheduler.start(USER, Some(Duration::from_secs(10))).await;

    // Tick at 10s is still waiting on the sensor
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(app.source.in_flight(), 1);

    assert!(scheduler.stop(USER));
    assert!(!scheduler.is_running(USER));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(app.source.in_flight(), 0);
    assert_eq!(app.source.calls(), 2, "no tick after stop");

    let latest = app.db.latest_reading(USER).await.unwrap().unwrap();
    assert_eq!(latest.value, 130.0, "in-flight reading was stored");
    assert_eq!(app.db.reading_count(), 2);
}
