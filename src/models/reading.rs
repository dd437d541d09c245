// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Glucose reading model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Factor between mmol/L and mg/dL for glucose.
pub const MMOL_TO_MG_DL: f64 = 18.0;

/// Unit a reading was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[serde(rename = "mg/dL")]
    #[default]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl GlucoseUnit {
    pub fn label(self) -> &'static str {
        match self {
            GlucoseUnit::MgDl => "mg/dL",
            GlucoseUnit::MmolL => "mmol/L",
        }
    }
}

/// How a reading was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMethod {
    Manual,
    Sensor,
}

/// Stored glucose reading.
///
/// Stored at `readings/{user_id}_{recorded_at_millis}`; the document ID makes
/// `(user_id, recorded_at)` unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Document ID (see [`Reading::document_id`])
    pub id: String,
    /// Owner
    pub user_id: u64,
    /// Measured value in `unit`
    pub value: f64,
    pub unit: GlucoseUnit,
    pub method: ReadingMethod,
    /// Where the value came from (e.g. "librelinkup", "app")
    pub source: String,
    /// When the measurement was taken
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub recorded_at: DateTime<Utc>,
    /// Meal context (e.g. "ayuno", "postprandial")
    pub label: Option<String>,
    pub notes: Option<String>,
    /// Sensor trend arrow (1 = falling quickly .. 5 = rising quickly)
    pub trend: Option<u8>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Reading {
    /// Build a new reading with its document ID derived from owner and timestamp.
    pub fn new(
        user_id: u64,
        value: f64,
        unit: GlucoseUnit,
        method: ReadingMethod,
        source: &str,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::document_id(user_id, recorded_at),
            user_id,
            value,
            unit,
            method,
            source: source.to_string(),
            recorded_at,
            label: None,
            notes: None,
            trend: None,
            created_at: Utc::now(),
        }
    }

    /// Document ID for a reading: `{user_id}_{recorded_at_millis}`.
    pub fn document_id(user_id: u64, recorded_at: DateTime<Utc>) -> String {
        format!("{}_{}", user_id, recorded_at.timestamp_millis())
    }

    /// Value converted to mg/dL, the unit thresholds are expressed in.
    pub fn value_mg_dl(&self) -> f64 {
        match self.unit {
            GlucoseUnit::MgDl => self.value,
            GlucoseUnit::MmolL => self.value * MMOL_TO_MG_DL,
        }
    }

    /// Reject NaN, infinities and non-positive values.
    pub fn has_valid_value(&self) -> bool {
        self.value.is_finite() && self.value > 0.0
    }
}

/// Owner edit of an existing reading.
#[derive(Debug, Clone, Default)]
pub struct ReadingUpdate {
    pub value: Option<f64>,
    pub label: Option<String>,
    pub notes: Option<String>,
}

impl ReadingUpdate {
    pub fn apply(&self, reading: &mut Reading) {
        if let Some(v) = self.value {
            reading.value = v;
        }
        if let Some(label) = &self.label {
            reading.label = Some(label.clone());
        }
        if let Some(notes) = &self.notes {
            reading.notes = Some(notes.clone());
        }
    }
}
