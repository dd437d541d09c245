// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reading sources: where monitoring ticks get the current glucose value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A value reported by a sensor, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReading {
    /// Glucose in mg/dL
    pub value_mg_dl: f64,
    /// When the sensor took the measurement
    pub recorded_at: DateTime<Utc>,
    /// Trend arrow (1 = falling quickly .. 5 = rising quickly)
    pub trend: Option<u8>,
}

/// Errors from a reading source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Sensor service unavailable: {0}")]
    Unavailable(String),

    #[error("Sensor authentication failed: {0}")]
    Auth(String),

    #[error("Invalid sensor data: {0}")]
    InvalidData(String),
}

/// Something that can report the current glucose value for a user.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Current value, or `None` if the source has nothing to report right now.
    async fn current_reading(&self, user_id: u64) -> Result<Option<SourceReading>, SourceError>;

    /// Label stored with readings from this source.
    fn name(&self) -> &str;
}

/// Source used when no sensor account is configured: never has a value.
#[derive(Debug, Default, Clone)]
pub struct UnavailableSource;

#[async_trait]
impl ReadingSource for UnavailableSource {
    async fn current_reading(&self, user_id: u64) -> Result<Option<SourceReading>, SourceError> {
        tracing::debug!(user_id, "No sensor configured, nothing to poll");
        Ok(None)
    }

    fn name(&self) -> &str {
        "none"
    }
}
