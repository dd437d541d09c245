// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user glucose threshold configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Glucose range boundaries and monitoring preferences for one user.
///
/// Stored at `thresholds/{user_id}`. Ordering of the four boundaries is
/// checked by the HTTP layer before a write; the stores persist whatever
/// they are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Owner (also used as document ID)
    pub user_id: u64,
    /// Below this value a reading is critical (mg/dL)
    pub hipo_min: f64,
    /// Lower edge of the normal range, inclusive (mg/dL)
    pub normal_min: f64,
    /// Upper edge of the normal range, inclusive (mg/dL)
    pub normal_max: f64,
    /// Above this value a reading is critical (mg/dL)
    pub hiper_max: f64,
    /// How often the user expects a measurement
    pub measurement_frequency_minutes: u32,
    /// Whether alerts are pushed to the user's devices
    pub notifications_enabled: bool,
    /// IANA timezone name (e.g. "America/Mexico_City")
    pub timezone: String,
    /// Language for notification text ("es", "en")
    pub locale: String,
    /// LibreLinkUp patient whose sensor feeds this user's monitoring
    #[serde(default)]
    pub sensor_patient_id: Option<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ThresholdConfig {
    /// True when every boundary is a usable number.
    pub fn is_complete(&self) -> bool {
        [self.hipo_min, self.normal_min, self.normal_max, self.hiper_max]
            .iter()
            .all(|v| v.is_finite())
    }

    /// True when `hipo_min <= normal_min <= normal_max <= hiper_max`.
    pub fn is_ordered(&self) -> bool {
        self.hipo_min <= self.normal_min
            && self.normal_min <= self.normal_max
            && self.normal_max <= self.hiper_max
    }

    /// Apply a partial update in place. Returns true if anything changed.
    pub fn apply(&mut self, update: &ThresholdUpdate) -> bool {
        let before = self.clone();

        if let Some(v) = update.hipo_min {
            self.hipo_min = v;
        }
        if let Some(v) = update.normal_min {
            self.normal_min = v;
        }
        if let Some(v) = update.normal_max {
            self.normal_max = v;
        }
        if let Some(v) = update.hiper_max {
            self.hiper_max = v;
        }
        if let Some(v) = update.measurement_frequency_minutes {
            self.measurement_frequency_minutes = v;
        }
        if let Some(v) = update.notifications_enabled {
            self.notifications_enabled = v;
        }
        if let Some(v) = &update.timezone {
            self.timezone = v.clone();
        }
        if let Some(v) = &update.locale {
            self.locale = v.clone();
        }
        if let Some(v) = &update.sensor_patient_id {
            self.sensor_patient_id = Some(v.clone());
        }

        *self != before
    }
}

/// Partial threshold update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdUpdate {
    pub hipo_min: Option<f64>,
    pub normal_min: Option<f64>,
    pub normal_max: Option<f64>,
    pub hiper_max: Option<f64>,
    pub measurement_frequency_minutes: Option<u32>,
    pub notifications_enabled: Option<bool>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub sensor_patient_id: Option<String>,
}

#[cfg(test)]
pub(crate) fn sample_config(user_id: u64) -> ThresholdConfig {
    let now = Utc::now();
    ThresholdConfig {
        user_id,
        hipo_min: 60.0,
        normal_min: 70.0,
        normal_max: 140.0,
        hiper_max: 180.0,
        measurement_frequency_minutes: 5,
        notifications_enabled: true,
        timezone: "America/Mexico_City".to_string(),
        locale: "es".to_string(),
        sensor_patient_id: None,
        created_at: now,
        updated_at: now,
    }
}
