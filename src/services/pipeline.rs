// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! One poll-and-process cycle: source, persist, classify, alert, dispatch.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{AlertKind, Classification, GlucoseUnit, Reading, ReadingMethod};
use crate::services::classifier::classify;
use crate::services::dispatcher::{notification_text, DispatchSummary, NotificationDispatcher};
use crate::services::retry::RetryPolicy;
use crate::services::source::ReadingSource;
use std::str::FromStr;
use std::sync::Arc;

/// Which classifications produce an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertPolicy {
    /// Only yellow and red readings
    #[default]
    NonNormal,
    /// Every configured reading, green included
    EveryReading,
}

impl AlertPolicy {
    pub fn should_alert(self, classification: &Classification) -> bool {
        match classification.kind {
            AlertKind::Unconfigured => false,
            AlertKind::Green => self == AlertPolicy::EveryReading,
            AlertKind::Yellow | AlertKind::Red => true,
        }
    }
}

impl FromStr for AlertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "non_normal" => Ok(AlertPolicy::NonNormal),
            "every_reading" => Ok(AlertPolicy::EveryReading),
            other => Err(format!("Unknown alert policy: {}", other)),
        }
    }
}

/// What happened to a reading after it was stored (or not).
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub classification: Classification,
    /// Set when an alert record was written
    pub alert_id: Option<String>,
    /// Set when the alert was sent to the user's devices
    pub dispatch: Option<DispatchSummary>,
}

/// Result of one monitoring cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Source had nothing to report; tick skipped
    NoReading,
    /// A reading with this timestamp was already stored; no alert
    Duplicate { reading: Reading },
    Processed {
        reading: Reading,
        /// False if the reading could not be persisted
        stored: bool,
        evaluation: Evaluation,
    },
}

/// Runs monitoring cycles for any user.
pub struct MonitorPipeline {
    db: Arc<dyn Database>,
    source: Arc<dyn ReadingSource>,
    dispatcher: NotificationDispatcher,
    retry: RetryPolicy,
    alert_policy: AlertPolicy,
}

impl MonitorPipeline {
    pub fn new(
        db: Arc<dyn Database>,
        source: Arc<dyn ReadingSource>,
        dispatcher: NotificationDispatcher,
        retry: RetryPolicy,
        alert_policy: AlertPolicy,
    ) -> Self {
        Self {
            db,
            source,
            dispatcher,
            retry,
            alert_policy,
        }
    }

    /// Poll the source for `user_id` and process what it returns.
    ///
    /// Only source failures are returned as errors. Persistence and dispatch
    /// failures are logged and the cycle carries on where it can.
    pub async fn run_cycle(&self, user_id: u64) -> Result<CycleOutcome, AppError> {
        let polled = self
            .retry
            .run("sensor_poll", || self.source.current_reading(user_id))
            .await
            .map_err(|e| AppError::Sensor(e.to_string()))?;

        let Some(polled) = polled else {
            tracing::info!(user_id, source = self.source.name(), "No reading available, skipping tick");
            return Ok(CycleOutcome::NoReading);
        };

        let mut reading = Reading::new(
            user_id,
            polled.value_mg_dl,
            GlucoseUnit::MgDl,
            ReadingMethod::Sensor,
            self.source.name(),
            polled.recorded_at,
        );
        reading.trend = polled.trend;

        if !reading.has_valid_value() {
            return Err(AppError::Sensor(format!(
                "Invalid glucose value {} from {}",
                reading.value,
                self.source.name()
            )));
        }

        let stored = match self.db.insert_reading(&reading).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(user_id, reading_id = %reading.id, "Duplicate reading, skipping");
                return Ok(CycleOutcome::Duplicate { reading });
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to store reading");
                false
            }
        };

        let evaluation = self.evaluate(&reading).await;
        Ok(CycleOutcome::Processed {
            reading,
            stored,
            evaluation,
        })
    }

    /// Classify an already stored reading, record an alert if the policy
    /// asks for one and notify the user's devices.
    pub async fn evaluate(&self, reading: &Reading) -> Evaluation {
        let user_id = reading.user_id;
        let value = reading.value_mg_dl();

        let thresholds = match self.db.get_thresholds(user_id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load thresholds");
                None
            }
        };

        let classification = classify(value, thresholds.as_ref());
        tracing::info!(
            user_id,
            value,
            kind = classification.kind.as_str(),
            comparator = classification.comparator.map(|c| c.as_str()),
            "Reading classified"
        );

        let mut evaluation = Evaluation {
            classification,
            alert_id: None,
            dispatch: None,
        };

        let Some(config) = thresholds else {
            return evaluation;
        };
        if !self.alert_policy.should_alert(&classification) {
            return evaluation;
        }

        let alert_id = match self.db.record_alert(user_id, &classification, value).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to record alert");
                return evaluation;
            }
        };
        evaluation.alert_id = Some(alert_id.clone());

        if !config.notifications_enabled {
            tracing::debug!(user_id, alert_id = %alert_id, "Notifications disabled, alert not sent");
            return evaluation;
        }

        let Some(text) = notification_text(&classification, value, &config.locale) else {
            return evaluation;
        };

        match self
            .dispatcher
            .dispatch(user_id, &text.title, &text.body, &alert_id)
            .await
        {
            Ok(summary) => evaluation.dispatch = Some(summary),
            Err(e) => tracing::error!(user_id, alert_id = %alert_id, error = %e, "Dispatch failed"),
        }

        evaluation
    }
}
