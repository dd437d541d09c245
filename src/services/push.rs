// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notification providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Expo push API endpoint.
pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";
/// Expo accepts at most 100 messages per request.
pub const EXPO_MAX_BATCH: usize = 100;

/// One notification to one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub sound: &'static str,
    pub priority: &'static str,
    pub data: serde_json::Value,
}

/// Per-message result reported by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushTicket {
    Ok {
        id: Option<String>,
    },
    Error {
        message: String,
        details: Option<PushTicketDetails>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushTicketDetails {
    pub error: Option<String>,
}

impl PushTicket {
    /// Whether the provider says the device token is no longer valid.
    pub fn is_device_not_registered(&self) -> bool {
        matches!(
            self,
            PushTicket::Error {
                details: Some(PushTicketDetails { error: Some(code) }),
                ..
            } if code == "DeviceNotRegistered"
        )
    }

    /// Error text for a failed ticket.
    pub fn error_reason(&self) -> Option<String> {
        match self {
            PushTicket::Ok { .. } => None,
            PushTicket::Error { message, details } => {
                match details.as_ref().and_then(|d| d.error.as_deref()) {
                    Some(code) => Some(format!("{}: {}", code, message)),
                    None => Some(message.clone()),
                }
            }
        }
    }
}

/// Errors sending a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push request failed: {0}")]
    Transport(String),

    #[error("Push provider rejected request: {0}")]
    Rejected(String),
}

/// A push notification service.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Largest batch accepted by a single `send_batch` call.
    fn max_batch_size(&self) -> usize {
        EXPO_MAX_BATCH
    }

    /// Send a batch; tickets are returned in message order.
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError>;
}

/// Expo push API client.
#[derive(Clone)]
pub struct ExpoPushClient {
    http: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ExpoPushResponse {
    #[serde(default)]
    data: Vec<PushTicket>,
    #[serde(default)]
    errors: Vec<ExpoRequestError>,
}

#[derive(Deserialize)]
struct ExpoRequestError {
    code: Option<String>,
    message: String,
}

impl ExpoPushClient {
    pub fn new(url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            access_token,
        }
    }
}

#[async_trait]
impl PushProvider for ExpoPushClient {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        let mut request = self.http.post(&self.url).json(messages);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                tracing::warn!("Expo push rate limit hit (429)");
            }
            return Err(PushError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        let body: ExpoPushResponse = response
            .json()
            .await
            .map_err(|e| PushError::Transport(format!("JSON parse error: {}", e)))?;

        parse_tickets(body, messages.len())
    }
}

fn parse_tickets(body: ExpoPushResponse, expected: usize) -> Result<Vec<PushTicket>, PushError> {
    if let Some(err) = body.errors.first() {
        let code = err.code.as_deref().unwrap_or("UNKNOWN");
        return Err(PushError::Rejected(format!("{}: {}", code, err.message)));
    }

    if body.data.len() != expected {
        return Err(PushError::Rejected(format!(
            "Expected {} tickets, got {}",
            expected,
            body.data.len()
        )));
    }

    Ok(body.data)
}
