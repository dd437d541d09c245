// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Glucose monitor: threshold-driven alerts for glucose readings
//!
//! This crate provides the backend API for a glucose tracking app. It stores
//! readings, classifies them against each user's thresholds, records alerts
//! and pushes notifications to the user's devices. Sensor accounts can be
//! polled on a per-user schedule.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Database;
use services::{MonitorPipeline, MonitorScheduler};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Database>,
    pub pipeline: Arc<MonitorPipeline>,
    pub scheduler: MonitorScheduler,
}

impl AppState {
    /// Wire the pipeline and scheduler around the given collaborators.
    pub fn new(
        config: Config,
        db: Arc<dyn Database>,
        source: Arc<dyn services::ReadingSource>,
        push: Arc<dyn services::PushProvider>,
    ) -> Self {
        let dispatcher = services::NotificationDispatcher::new(db.clone(), push, config.retry);
        let pipeline = Arc::new(MonitorPipeline::new(
            db.clone(),
            source,
            dispatcher,
            config.retry,
            config.alert_policy,
        ));
        let scheduler = MonitorScheduler::new(
            pipeline.clone(),
            std::time::Duration::from_millis(config.default_interval_ms),
        );

        Self {
            config,
            db,
            pipeline,
            scheduler,
        }
    }
}
