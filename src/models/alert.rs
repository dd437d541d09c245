// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Alert model: classification results and their delivery state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity bucket a reading falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Inside the normal range
    Green,
    /// Within the warning margin just outside the normal range
    Yellow,
    /// Beyond the hypo/hyper limits
    Red,
    /// No usable thresholds for the user
    Unconfigured,
}

impl AlertKind {
    /// Alert priority: 1 = normal, 2 = warning, 3 = critical.
    pub fn priority(self) -> Option<u8> {
        match self {
            AlertKind::Green => Some(1),
            AlertKind::Yellow => Some(2),
            AlertKind::Red => Some(3),
            AlertKind::Unconfigured => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::Green => "green",
            AlertKind::Yellow => "yellow",
            AlertKind::Red => "red",
            AlertKind::Unconfigured => "unconfigured",
        }
    }
}

/// Where the reading sits relative to the range that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Below,
    #[serde(rename = ">")]
    Above,
    #[serde(rename = "between")]
    Between,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Below => "<",
            Comparator::Above => ">",
            Comparator::Between => "between",
        }
    }
}

/// Output of the classifier. Kind and comparator are only ever produced
/// together by [`crate::services::classifier::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: AlertKind,
    pub comparator: Option<Comparator>,
    pub priority: Option<u8>,
}

impl Classification {
    pub(crate) fn unconfigured() -> Self {
        Self {
            kind: AlertKind::Unconfigured,
            comparator: None,
            priority: None,
        }
    }

    pub(crate) fn new(kind: AlertKind, comparator: Comparator) -> Self {
        Self {
            kind,
            comparator: Some(comparator),
            priority: kind.priority(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.kind != AlertKind::Unconfigured
    }
}

/// Delivery state of an alert's push notification.
///
/// Moves forward only: pending -> sent, pending -> error, sent -> error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Error,
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Error => 2,
        }
    }

    /// Whether a transition from `self` to `next` moves forward.
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Error => "error",
        }
    }
}

/// Stored alert record (append-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// UUID, also used as document ID
    pub alert_id: String,
    pub user_id: u64,
    pub kind: AlertKind,
    /// Reading value (mg/dL) that produced this alert
    pub triggering_value: f64,
    pub comparator: Comparator,
    pub priority: u8,
    pub delivery_status: DeliveryStatus,
    /// Raw provider/transport error for `DeliveryStatus::Error`
    pub delivery_error: Option<String>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Build a pending alert from a configured classification.
    ///
    /// Returns `None` for [`AlertKind::Unconfigured`], which never produces a record.
    pub fn from_classification(
        user_id: u64,
        classification: &Classification,
        triggering_value: f64,
    ) -> Option<Self> {
        let comparator = classification.comparator?;
        let priority = classification.priority?;
        let now = Utc::now();

        Some(Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind: classification.kind,
            triggering_value,
            comparator,
            priority,
            delivery_status: DeliveryStatus::Pending,
            delivery_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move to `next` if that is a forward transition. Returns true if applied.
    pub fn transition(&mut self, next: DeliveryStatus, reason: Option<&str>) -> bool {
        if !self.delivery_status.can_transition_to(next) {
            return false;
        }
        self.delivery_status = next;
        if let Some(reason) = reason {
            self.delivery_error = Some(reason.to_string());
        }
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        use DeliveryStatus::*;

        assert!(Pending.can_transition_to(Sent));
        assert!(Pending.can_transition_to(Error));
        assert!(Sent.can_transition_to(Error));

        assert!(!Sent.can_transition_to(Pending));
        assert!(!Error.can_transition_to(Sent));
        assert!(!Error.can_transition_to(Pending));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn test_unconfigured_builds_no_alert() {
        let alert = Alert::from_classification(1, &Classification::unconfigured(), 100.0);
        assert!(alert.is_none());
    }

    #[test]
    fn test_transition_records_reason() {
        let classification = Classification::new(AlertKind::Red, Comparator::Below);
        let mut alert = Alert::from_classification(1, &classification, 50.0).unwrap();
        assert_eq!(alert.priority, 3);
        assert_eq!(alert.delivery_status, DeliveryStatus::Pending);

        assert!(alert.transition(DeliveryStatus::Error, Some("DeviceNotRegistered")));
        assert_eq!(alert.delivery_error.as_deref(), Some("DeviceNotRegistered"));
        assert!(!alert.transition(DeliveryStatus::Sent, None));
        assert_eq!(alert.delivery_status, DeliveryStatus::Error);
    }

    #[test]
    fn test_comparator_wire_format() {
        assert_eq!(serde_json::to_string(&Comparator::Below).unwrap(), "\"<\"");
        assert_eq!(
            serde_json::to_string(&Comparator::Between).unwrap(),
            "\"between\""
        );
    }
}
