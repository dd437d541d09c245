// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Thresholds (one document per user)
//! - Readings (document ID `{user_id}_{recorded_at_millis}` enforces uniqueness)
//! - Alerts (append-only, delivery status updated in place)
//! - Push tokens (document ID `{user_id}_{urlencoded token}`)

use super::{collections, new_alert, AlertStore, PushTokenStore, ReadingStore, ThresholdStore};
use crate::error::AppError;
use crate::models::{
    Alert, Classification, DeliveryStatus, PushToken, Reading, ReadingUpdate, ThresholdConfig,
    ThresholdUpdate,
};
use async_trait::async_trait;
use firestore::errors::FirestoreError;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes an unauthenticated connection; skip credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Overwrite a document with `object`.
    async fn put<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: serde::Serialize + Sync + Send + for<'de> serde::Deserialize<'de>,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Read-modify-write of an alert's delivery status.
    async fn transition_alert(
        &self,
        alert_id: &str,
        next: DeliveryStatus,
        reason: Option<&str>,
    ) -> Result<(), AppError> {
        let mut alert = self
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Alert {}", alert_id)))?;

        if !alert.transition(next, reason) {
            tracing::debug!(
                alert_id,
                from = alert.delivery_status.as_str(),
                to = next.as_str(),
                "Ignoring backward delivery status transition"
            );
            return Ok(());
        }

        self.put(collections::ALERTS, alert_id, &alert).await
    }
}

// ─── Threshold Operations ────────────────────────────────────────

#[async_trait]
impl ThresholdStore for FirestoreDb {
    async fn get_thresholds(&self, user_id: u64) -> Result<Option<ThresholdConfig>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::THRESHOLDS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn create_thresholds(
        &self,
        config: &ThresholdConfig,
    ) -> Result<ThresholdConfig, AppError> {
        let result: Result<ThresholdConfig, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::THRESHOLDS)
            .document_id(config.user_id.to_string())
            .object(config)
            .execute()
            .await;

        match result {
            Ok(created) => Ok(created),
            Err(FirestoreError::DataConflictError(_)) => Err(AppError::Conflict(format!(
                "Thresholds for user {} already exist",
                config.user_id
            ))),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn update_thresholds(
        &self,
        user_id: u64,
        update: &ThresholdUpdate,
    ) -> Result<ThresholdConfig, AppError> {
        let mut config = self
            .get_thresholds(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Thresholds for user {}", user_id)))?;

        if config.apply(update) {
            config.updated_at = chrono::Utc::now();
            self.put(collections::THRESHOLDS, &user_id.to_string(), &config)
                .await?;
        }

        Ok(config)
    }

    async fn replace_thresholds(
        &self,
        config: &ThresholdConfig,
    ) -> Result<ThresholdConfig, AppError> {
        if self.get_thresholds(config.user_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Thresholds for user {}",
                config.user_id
            )));
        }

        let replaced = ThresholdConfig {
            updated_at: chrono::Utc::now(),
            ..config.clone()
        };
        self.put(collections::THRESHOLDS, &config.user_id.to_string(), &replaced)
            .await?;

        Ok(replaced)
    }
}

// ─── Reading Operations ──────────────────────────────────────────

#[async_trait]
impl ReadingStore for FirestoreDb {
    async fn insert_reading(&self, reading: &Reading) -> Result<bool, AppError> {
        // Insert fails on an existing document ID, which is what makes
        // (user_id, recorded_at) unique without a prior read.
        let result: Result<Reading, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::READINGS)
            .document_id(&reading.id)
            .object(reading)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(
                    user_id = reading.user_id,
                    reading_id = %reading.id,
                    "Reading already stored (duplicate timestamp)"
                );
                Ok(false)
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn latest_reading(&self, user_id: u64) -> Result<Option<Reading>, AppError> {
        Ok(self.list_readings(user_id, 1).await?.into_iter().next())
    }

    async fn list_readings(&self, user_id: u64, limit: u32) -> Result<Vec<Reading>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::READINGS)
            .filter(move |q| q.field("user_id").eq(user_id))
            .order_by([("recorded_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_reading(
        &self,
        user_id: u64,
        reading_id: &str,
    ) -> Result<Option<Reading>, AppError> {
        let reading: Option<Reading> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::READINGS)
            .obj()
            .one(reading_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Readings are only visible to their owner
        Ok(reading.filter(|r| r.user_id == user_id))
    }

    async fn update_reading(
        &self,
        user_id: u64,
        reading_id: &str,
        update: &ReadingUpdate,
    ) -> Result<Reading, AppError> {
        let mut reading = self
            .get_reading(user_id, reading_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reading {}", reading_id)))?;

        update.apply(&mut reading);
        self.put(collections::READINGS, reading_id, &reading).await?;
        Ok(reading)
    }

    async fn delete_reading(&self, user_id: u64, reading_id: &str) -> Result<bool, AppError> {
        if self.get_reading(user_id, reading_id).await?.is_none() {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::READINGS)
            .document_id(reading_id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }
}

// ─── Alert Operations ────────────────────────────────────────────

#[async_trait]
impl AlertStore for FirestoreDb {
    async fn record_alert(
        &self,
        user_id: u64,
        classification: &Classification,
        triggering_value: f64,
    ) -> Result<String, AppError> {
        let alert = new_alert(user_id, classification, triggering_value)?;

        let _: Alert = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ALERTS)
            .document_id(&alert.alert_id)
            .object(&alert)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(alert.alert_id)
    }

    async fn mark_sent(&self, alert_id: &str) -> Result<(), AppError> {
        self.transition_alert(alert_id, DeliveryStatus::Sent, None)
            .await
    }

    async fn mark_error(&self, alert_id: &str, reason: &str) -> Result<(), AppError> {
        self.transition_alert(alert_id, DeliveryStatus::Error, Some(reason))
            .await
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ALERTS)
            .obj()
            .one(alert_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_alerts(&self, user_id: u64, limit: u32) -> Result<Vec<Alert>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ALERTS)
            .filter(move |q| q.field("user_id").eq(user_id))
            .order_by([("created_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Push Token Operations ───────────────────────────────────────

#[async_trait]
impl PushTokenStore for FirestoreDb {
    async fn register_push_token(&self, token: &PushToken) -> Result<(), AppError> {
        let mut token = token.clone();
        token.active = true;

        let doc_id = PushToken::document_id(token.user_id, &token.token);
        self.put(collections::PUSH_TOKENS, &doc_id, &token).await
    }

    async fn deactivate_push_token(&self, user_id: u64, token: &str) -> Result<bool, AppError> {
        let doc_id = PushToken::document_id(user_id, token);

        let existing: Option<PushToken> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PUSH_TOKENS)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(mut record) = existing else {
            return Ok(false);
        };

        if record.active {
            record.active = false;
            self.put(collections::PUSH_TOKENS, &doc_id, &record).await?;
        }
        Ok(true)
    }

    async fn active_push_tokens(&self, user_id: u64) -> Result<Vec<PushToken>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PUSH_TOKENS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("active").eq(true),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
