// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod alert;
pub mod push_token;
pub mod reading;
pub mod threshold;

pub use alert::{Alert, AlertKind, Classification, Comparator, DeliveryStatus};
pub use push_token::PushToken;
pub use reading::{GlucoseUnit, Reading, ReadingMethod, ReadingUpdate};
pub use threshold::{ThresholdConfig, ThresholdUpdate};
