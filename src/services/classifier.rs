// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Threshold classification of glucose readings.

use crate::models::{AlertKind, Classification, Comparator, ThresholdConfig};

/// Width of the warning band just outside the normal range (mg/dL).
pub const YELLOW_MARGIN_MG_DL: f64 = 5.0;

/// Classify a reading (mg/dL) against a user's thresholds.
///
/// Checks run in a fixed order and the first match wins:
/// 1. below `hipo_min` -> red `<`
/// 2. above `hiper_max` -> red `>`
/// 3. within the margin below `normal_min` -> yellow `<`
/// 4. within the margin above `normal_max` -> yellow `>`
/// 5. anything else -> green `between`
///
/// The normal range is inclusive at both ends. Missing or non-finite
/// thresholds classify as unconfigured.
pub fn classify(value: f64, thresholds: Option<&ThresholdConfig>) -> Classification {
    let Some(t) = thresholds.filter(|t| t.is_complete()) else {
        return Classification::unconfigured();
    };

    if value < t.hipo_min {
        Classification::new(AlertKind::Red, Comparator::Below)
    } else if value > t.hiper_max {
        Classification::new(AlertKind::Red, Comparator::Above)
    } else if value >= t.normal_min - YELLOW_MARGIN_MG_DL && value < t.normal_min {
        Classification::new(AlertKind::Yellow, Comparator::Below)
    } else if value > t.normal_max && value <= t.normal_max + YELLOW_MARGIN_MG_DL {
        Classification::new(AlertKind::Yellow, Comparator::Above)
    } else {
        Classification::new(AlertKind::Green, Comparator::Between)
    }
}
