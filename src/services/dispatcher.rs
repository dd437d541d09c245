// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push notification fan-out for alerts.

use crate::db::Database;
use crate::error::AppError;
use crate::models::{AlertKind, Classification, Comparator};
use crate::services::push::{PushError, PushMessage, PushProvider, PushTicket};
use crate::services::retry::RetryPolicy;
use futures_util::{stream, StreamExt};
use std::sync::Arc;

/// Maximum number of provider requests in flight for one dispatch.
const MAX_CONCURRENT_BATCHES: usize = 4;

/// Title and body shown on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationText {
    pub title: String,
    pub body: String,
}

/// Pick notification text for a classification in the user's language.
///
/// Unknown locales get Spanish. Returns `None` for unconfigured results.
pub fn notification_text(
    classification: &Classification,
    value_mg_dl: f64,
    locale: &str,
) -> Option<NotificationText> {
    let english = locale.to_ascii_lowercase().starts_with("en");
    let value = format!("{:.0} mg/dL", value_mg_dl);
    let comparator = classification.comparator?;

    let (title, body) = match (classification.kind, comparator, english) {
        (AlertKind::Red, Comparator::Below, false) => (
            "Alerta: glucosa muy baja",
            format!("Tu glucosa es {}, por debajo de tu límite de hipoglucemia.", value),
        ),
        (AlertKind::Red, Comparator::Below, true) => (
            "Alert: very low glucose",
            format!("Your glucose is {}, below your hypoglycemia limit.", value),
        ),
        (AlertKind::Red, _, false) => (
            "Alerta: glucosa muy alta",
            format!("Tu glucosa es {}, por encima de tu límite de hiperglucemia.", value),
        ),
        (AlertKind::Red, _, true) => (
            "Alert: very high glucose",
            format!("Your glucose is {}, above your hyperglycemia limit.", value),
        ),
        (AlertKind::Yellow, Comparator::Below, false) => (
            "Precaución: glucosa baja",
            format!("Tu glucosa es {}, cerca del límite inferior de tu rango normal.", value),
        ),
        (AlertKind::Yellow, Comparator::Below, true) => (
            "Warning: low glucose",
            format!("Your glucose is {}, close to the bottom of your normal range.", value),
        ),
        (AlertKind::Yellow, _, false) => (
            "Precaución: glucosa alta",
            format!("Tu glucosa es {}, cerca del límite superior de tu rango normal.", value),
        ),
        (AlertKind::Yellow, _, true) => (
            "Warning: high glucose",
            format!("Your glucose is {}, close to the top of your normal range.", value),
        ),
        (AlertKind::Green, _, false) => (
            "Glucosa en rango",
            format!("Tu glucosa es {}, dentro de tu rango normal.", value),
        ),
        (AlertKind::Green, _, true) => (
            "Glucose in range",
            format!("Your glucose is {}, within your normal range.", value),
        ),
        (AlertKind::Unconfigured, _, _) => return None,
    };

    Some(NotificationText {
        title: title.to_string(),
        body,
    })
}

/// Totals for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Active tokens the alert was addressed to
    pub tokens: usize,
    /// Provider requests made
    pub batches: usize,
    /// Messages the provider accepted
    pub sent: usize,
    /// Messages that failed (ticket error or whole-batch failure)
    pub failed: usize,
    /// Tokens deactivated because the device is no longer registered
    pub deactivated: usize,
}

/// Result of sending one batch, collected before the alert is updated.
struct BatchReport {
    tokens: Vec<String>,
    result: Result<Vec<PushTicket>, PushError>,
}

/// Sends an alert to every active device of a user and records the outcome
/// on the alert.
pub struct NotificationDispatcher {
    db: Arc<dyn Database>,
    provider: Arc<dyn PushProvider>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<dyn Database>, provider: Arc<dyn PushProvider>, retry: RetryPolicy) -> Self {
        Self {
            db,
            provider,
            retry,
        }
    }

    /// Send `title`/`body` to all active tokens of `user_id`.
    ///
    /// With no active tokens nothing is sent and the alert stays pending.
    /// Otherwise every batch reports to the alert: a fully accepted batch
    /// marks it sent, any failure marks it error.
    pub async fn dispatch(
        &self,
        user_id: u64,
        title: &str,
        body: &str,
        alert_id: &str,
    ) -> Result<DispatchSummary, AppError> {
        let tokens: Vec<String> = self
            .db
            .active_push_tokens(user_id)
            .await?
            .into_iter()
            .map(|t| t.token)
            .collect();

        if tokens.is_empty() {
            tracing::info!(user_id, alert_id, "No active push tokens, skipping dispatch");
            return Ok(DispatchSummary::default());
        }

        let batch_size = self.provider.max_batch_size().max(1);
        let batches: Vec<Vec<String>> = tokens.chunks(batch_size).map(|c| c.to_vec()).collect();

        let mut summary = DispatchSummary {
            tokens: tokens.len(),
            batches: batches.len(),
            ..Default::default()
        };

        let reports: Vec<BatchReport> = stream::iter(batches)
            .map(|tokens| async move {
                let messages: Vec<PushMessage> = tokens
                    .iter()
                    .map(|to| PushMessage {
                        to: to.clone(),
                        title: title.to_string(),
                        body: body.to_string(),
                        sound: "default",
                        priority: "high",
                        data: serde_json::json!({ "alertId": alert_id }),
                    })
                    .collect();

                let result = self
                    .retry
                    .run("push_send_batch", || self.provider.send_batch(&messages))
                    .await;

                BatchReport { tokens, result }
            })
            .buffer_unordered(MAX_CONCURRENT_BATCHES)
            .collect()
            .await;

        // Status updates are applied one at a time after all sends finish
        for report in reports {
            self.apply_report(user_id, alert_id, report, &mut summary)
                .await;
        }

        tracing::info!(
            user_id,
            alert_id,
            tokens = summary.tokens,
            batches = summary.batches,
            sent = summary.sent,
            failed = summary.failed,
            deactivated = summary.deactivated,
            "Alert dispatched"
        );

        Ok(summary)
    }

    async fn apply_report(
        &self,
        user_id: u64,
        alert_id: &str,
        report: BatchReport,
        summary: &mut DispatchSummary,
    ) {
        let tickets = match report.result {
            Ok(tickets) => tickets,
            Err(e) => {
                tracing::warn!(user_id, alert_id, error = %e, "Push batch failed");
                summary.failed += report.tokens.len();
                self.mark_error(alert_id, &e.to_string()).await;
                return;
            }
        };

        let mut first_error = None;
        for (token, ticket) in report.tokens.iter().zip(tickets.iter()) {
            let Some(reason) = ticket.error_reason() else {
                summary.sent += 1;
                continue;
            };

            summary.failed += 1;
            if ticket.is_device_not_registered() {
                match self.db.deactivate_push_token(user_id, token).await {
                    Ok(true) => summary.deactivated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Failed to deactivate push token")
                    }
                }
            }
            first_error.get_or_insert(reason);
        }

        match first_error {
            None => {
                if let Err(e) = self.db.mark_sent(alert_id).await {
                    tracing::error!(alert_id, error = %e, "Failed to mark alert sent");
                }
            }
            Some(reason) => self.mark_error(alert_id, &reason).await,
        }
    }

    async fn mark_error(&self, alert_id: &str, reason: &str) {
        if let Err(e) = self.db.mark_error(alert_id, reason).await {
            tracing::error!(alert_id, error = %e, "Failed to mark alert error");
        }
    }
}
