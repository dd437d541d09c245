// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store for local development and tests.
//!
//! Mirrors the Firestore document layout: every map is keyed by the same
//! document ID the Firestore backend uses, so uniqueness rules match.

use super::{new_alert, AlertStore, PushTokenStore, ReadingStore, ThresholdStore};
use crate::error::AppError;
use crate::models::{
    Alert, Classification, DeliveryStatus, PushToken, Reading, ReadingUpdate, ThresholdConfig,
    ThresholdUpdate,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// DashMap-backed implementation of every store trait.
#[derive(Clone, Default)]
pub struct MemoryDb {
    thresholds: Arc<DashMap<u64, ThresholdConfig>>,
    readings: Arc<DashMap<String, Reading>>,
    alerts: Arc<DashMap<String, Alert>>,
    push_tokens: Arc<DashMap<String, PushToken>>,
    /// When set, every write fails (to exercise persistence error paths).
    fail_writes: Arc<AtomicBool>,
    /// When set, threshold reads yield once after taking their snapshot.
    yield_on_reads: Arc<AtomicBool>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make threshold reads yield to the runtime between reading and returning.
    pub fn set_yield_on_reads(&self, enabled: bool) {
        self.yield_on_reads.store(enabled, Ordering::SeqCst);
    }

    /// Number of stored readings across all users.
    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }

    /// Number of stored alerts across all users.
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("Simulated write failure".to_string()));
        }
        Ok(())
    }

    fn transition_alert(
        &self,
        alert_id: &str,
        next: DeliveryStatus,
        reason: Option<&str>,
    ) -> Result<(), AppError> {
        self.check_writable()?;

        let mut alert = self
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| AppError::NotFound(format!("Alert {}", alert_id)))?;

        if !alert.transition(next, reason) {
            tracing::debug!(
                alert_id,
                from = alert.delivery_status.as_str(),
                to = next.as_str(),
                "Ignoring backward delivery status transition"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ThresholdStore for MemoryDb {
    async fn get_thresholds(&self, user_id: u64) -> Result<Option<ThresholdConfig>, AppError> {
        let config = self.thresholds.get(&user_id).map(|c| c.value().clone());
        if self.yield_on_reads.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(config)
    }

    async fn create_thresholds(
        &self,
        config: &ThresholdConfig,
    ) -> Result<ThresholdConfig, AppError> {
        self.check_writable()?;

        match self.thresholds.entry(config.user_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "Thresholds for user {} already exist",
                config.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(config.clone());
                Ok(config.clone())
            }
        }
    }

    async fn update_thresholds(
        &self,
        user_id: u64,
        update: &ThresholdUpdate,
    ) -> Result<ThresholdConfig, AppError> {
        self.check_writable()?;

        let mut config = self
            .thresholds
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("Thresholds for user {}", user_id)))?;

        if config.apply(update) {
            config.updated_at = Utc::now();
        }
        Ok(config.value().clone())
    }

    async fn replace_thresholds(
        &self,
        config: &ThresholdConfig,
    ) -> Result<ThresholdConfig, AppError> {
        self.check_writable()?;

        let mut stored = self
            .thresholds
            .get_mut(&config.user_id)
            .ok_or_else(|| AppError::NotFound(format!("Thresholds for user {}", config.user_id)))?;

        *stored = ThresholdConfig {
            updated_at: Utc::now(),
            ..config.clone()
        };
        Ok(stored.value().clone())
    }
}

#[async_trait]
impl ReadingStore for MemoryDb {
    async fn insert_reading(&self, reading: &Reading) -> Result<bool, AppError> {
        self.check_writable()?;

        match self.readings.entry(reading.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(reading.clone());
                Ok(true)
            }
        }
    }

    async fn latest_reading(&self, user_id: u64) -> Result<Option<Reading>, AppError> {
        Ok(self.list_readings(user_id, 1).await?.into_iter().next())
    }

    async fn list_readings(&self, user_id: u64, limit: u32) -> Result<Vec<Reading>, AppError> {
        let mut readings: Vec<Reading> = self
            .readings
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();

        readings.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        readings.truncate(limit as usize);
        Ok(readings)
    }

    async fn get_reading(
        &self,
        user_id: u64,
        reading_id: &str,
    ) -> Result<Option<Reading>, AppError> {
        Ok(self
            .readings
            .get(reading_id)
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone()))
    }

    async fn update_reading(
        &self,
        user_id: u64,
        reading_id: &str,
        update: &ReadingUpdate,
    ) -> Result<Reading, AppError> {
        self.check_writable()?;

        let mut reading = self
            .readings
            .get_mut(reading_id)
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Reading {}", reading_id)))?;

        update.apply(&mut reading);
        Ok(reading.value().clone())
    }

    async fn delete_reading(&self, user_id: u64, reading_id: &str) -> Result<bool, AppError> {
        self.check_writable()?;

        Ok(self
            .readings
            .remove_if(reading_id, |_, r| r.user_id == user_id)
            .is_some())
    }
}

#[async_trait]
impl AlertStore for MemoryDb {
    async fn record_alert(
        &self,
        user_id: u64,
        classification: &Classification,
        triggering_value: f64,
    ) -> Result<String, AppError> {
        self.check_writable()?;

        let alert = new_alert(user_id, classification, triggering_value)?;
        let alert_id = alert.alert_id.clone();
        self.alerts.insert(alert_id.clone(), alert);
        Ok(alert_id)
    }

    async fn mark_sent(&self, alert_id: &str) -> Result<(), AppError> {
        self.transition_alert(alert_id, DeliveryStatus::Sent, None)
    }

    async fn mark_error(&self, alert_id: &str, reason: &str) -> Result<(), AppError> {
        self.transition_alert(alert_id, DeliveryStatus::Error, Some(reason))
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, AppError> {
        Ok(self.alerts.get(alert_id).map(|a| a.value().clone()))
    }

    async fn list_alerts(&self, user_id: u64, limit: u32) -> Result<Vec<Alert>, AppError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.value().clone())
            .collect();

        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(limit as usize);
        Ok(alerts)
    }
}

#[async_trait]
impl PushTokenStore for MemoryDb {
    async fn register_push_token(&self, token: &PushToken) -> Result<(), AppError> {
        self.check_writable()?;

        let doc_id = PushToken::document_id(token.user_id, &token.token);
        let mut token = token.clone();
        token.active = true;
        self.push_tokens.insert(doc_id, token);
        Ok(())
    }

    async fn deactivate_push_token(&self, user_id: u64, token: &str) -> Result<bool, AppError> {
        self.check_writable()?;

        let doc_id = PushToken::document_id(user_id, token);
        match self.push_tokens.get_mut(&doc_id) {
            Some(mut record) => {
                record.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn active_push_tokens(&self, user_id: u64) -> Result<Vec<PushToken>, AppError> {
        Ok(self
            .push_tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.active)
            .map(|t| t.value().clone())
            .collect())
    }
}
