// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notification destination model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device registered to receive push notifications for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushToken {
    pub user_id: u64,
    /// Expo push token (`ExponentPushToken[...]`)
    pub token: String,
    /// "ios" / "android", as reported by the app
    pub platform: Option<String>,
    /// Inactive tokens are kept for history but never sent to
    pub active: bool,
    #[serde(with = "firestore::serialize_as_timestamp")]
    pub registered_at: DateTime<Utc>,
}

impl PushToken {
    /// Document ID: `{user_id}_{urlencoded token}`.
    pub fn document_id(user_id: u64, token: &str) -> String {
        format!("{}_{}", user_id, urlencoding::encode(token))
    }
}

/// True if the token looks like an Expo push token.
pub fn is_expo_push_token(token: &str) -> bool {
    (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']')
}
