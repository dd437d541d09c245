// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Each store is a trait so the monitoring pipeline can run against
//! Firestore in production and [`MemoryDb`] locally and in tests.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use self::memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    Alert, Classification, PushToken, Reading, ReadingUpdate, ThresholdConfig, ThresholdUpdate,
};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const THRESHOLDS: &str = "thresholds";
    pub const READINGS: &str = "readings";
    pub const ALERTS: &str = "alerts";
    pub const PUSH_TOKENS: &str = "push_tokens";
}

/// Per-user threshold configuration.
#[async_trait]
pub trait ThresholdStore: Send + Sync {
    async fn get_thresholds(&self, user_id: u64) -> Result<Option<ThresholdConfig>, AppError>;

    /// Fails with [`AppError::Conflict`] if the user already has a configuration.
    async fn create_thresholds(
        &self,
        config: &ThresholdConfig,
    ) -> Result<ThresholdConfig, AppError>;

    /// Fails with [`AppError::NotFound`] if the user has no configuration.
    async fn update_thresholds(
        &self,
        user_id: u64,
        update: &ThresholdUpdate,
    ) -> Result<ThresholdConfig, AppError>;

    /// Overwrite the whole configuration with `config`, stamping `updated_at`.
    ///
    /// Fails with [`AppError::NotFound`] if the user has no configuration.
    async fn replace_thresholds(
        &self,
        config: &ThresholdConfig,
    ) -> Result<ThresholdConfig, AppError>;
}

/// Glucose readings, unique per `(user_id, recorded_at)`.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Store a reading. Returns `false` if one already exists for the same
    /// user and timestamp (nothing is written).
    async fn insert_reading(&self, reading: &Reading) -> Result<bool, AppError>;

    async fn latest_reading(&self, user_id: u64) -> Result<Option<Reading>, AppError>;

    /// Most recent readings first.
    async fn list_readings(&self, user_id: u64, limit: u32) -> Result<Vec<Reading>, AppError>;

    async fn get_reading(&self, user_id: u64, reading_id: &str)
        -> Result<Option<Reading>, AppError>;

    async fn update_reading(
        &self,
        user_id: u64,
        reading_id: &str,
        update: &ReadingUpdate,
    ) -> Result<Reading, AppError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete_reading(&self, user_id: u64, reading_id: &str) -> Result<bool, AppError>;
}

/// Append-only alert records.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist a pending alert and return its ID.
    ///
    /// Unconfigured classifications are rejected with [`AppError::BadRequest`].
    async fn record_alert(
        &self,
        user_id: u64,
        classification: &Classification,
        triggering_value: f64,
    ) -> Result<String, AppError>;

    async fn mark_sent(&self, alert_id: &str) -> Result<(), AppError>;

    async fn mark_error(&self, alert_id: &str, reason: &str) -> Result<(), AppError>;

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, AppError>;

    /// Most recent alerts first.
    async fn list_alerts(&self, user_id: u64, limit: u32) -> Result<Vec<Alert>, AppError>;
}

/// Registered push destinations.
#[async_trait]
pub trait PushTokenStore: Send + Sync {
    /// Register or reactivate a token.
    async fn register_push_token(&self, token: &PushToken) -> Result<(), AppError>;

    /// Returns `false` if the token was unknown.
    async fn deactivate_push_token(&self, user_id: u64, token: &str) -> Result<bool, AppError>;

    async fn active_push_tokens(&self, user_id: u64) -> Result<Vec<PushToken>, AppError>;
}

/// Everything the application needs from persistence.
pub trait Database: ThresholdStore + ReadingStore + AlertStore + PushTokenStore {}

impl<T> Database for T where T: ThresholdStore + ReadingStore + AlertStore + PushTokenStore {}

/// Build the alert record for a classification, or reject unconfigured ones.
pub(crate) fn new_alert(
    user_id: u64,
    classification: &Classification,
    triggering_value: f64,
) -> Result<Alert, AppError> {
    Alert::from_classification(user_id, classification, triggering_value).ok_or_else(|| {
        AppError::BadRequest("Unconfigured classifications do not produce alerts".to_string())
    })
}
