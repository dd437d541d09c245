// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push token registration and alert history.

use crate::error::{AppError, Result};
use crate::models::push_token::is_expo_push_token;
use crate::models::{Alert, PushToken};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_ALERT_LIMIT: u32 = 50;
const MAX_ALERT_LIMIT: u32 = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notificaciones/registrar-token", post(register_token))
        .route("/notificaciones/desactivar-token", post(deactivate_token))
        .route("/alertas/{usuario_id}", get(list_alerts))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTokenRequest {
    pub usuario_id: u64,
    #[validate(length(min = 1, max = 256))]
    pub token: String,
    #[validate(length(max = 32))]
    pub plataforma: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateTokenRequest {
    pub usuario_id: u64,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub mensaje: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub usuario_id: u64,
    pub activo: bool,
}

/// Register (or reactivate) an Expo push token for a user.
async fn register_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<Json<TokenResponse>> {
    req.validate()?;

    let token = req.token.trim().to_string();
    if !is_expo_push_token(&token) {
        return Err(AppError::BadRequest(
            "Token must be an Expo push token (ExponentPushToken[...])".to_string(),
        ));
    }

    state
        .db
        .register_push_token(&PushToken {
            user_id: req.usuario_id,
            token,
            platform: req.plataforma,
            active: true,
            registered_at: chrono::Utc::now(),
        })
        .await?;

    tracing::info!(user_id = req.usuario_id, "Push token registered");
    Ok(Json(TokenResponse {
        mensaje: "Token registrado".to_string(),
        usuario_id: req.usuario_id,
        activo: true,
    }))
}

async fn deactivate_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeactivateTokenRequest>,
) -> Result<Json<TokenResponse>> {
    let found = state
        .db
        .deactivate_push_token(req.usuario_id, req.token.trim())
        .await?;
    if !found {
        return Err(AppError::NotFound("Push token".to_string()));
    }

    tracing::info!(user_id = req.usuario_id, "Push token deactivated");
    Ok(Json(TokenResponse {
        mensaje: "Token desactivado".to_string(),
        usuario_id: req.usuario_id,
        activo: false,
    }))
}

// ─── Alert history ───────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct AlertResponse {
    pub alerta_id: String,
    pub tipo: String,
    pub comparador: String,
    pub prioridad: u8,
    pub valor: f64,
    pub estado_entrega: String,
    pub error_entrega: Option<String>,
    pub creado_en: String,
    pub actualizado_en: String,
}

impl From<Alert> for AlertResponse {
    fn from(alert: Alert) -> Self {
        Self {
            alerta_id: alert.alert_id,
            tipo: alert.kind.as_str().to_string(),
            comparador: alert.comparator.as_str().to_string(),
            prioridad: alert.priority,
            valor: alert.triggering_value,
            estado_entrega: alert.delivery_status.as_str().to_string(),
            error_entrega: alert.delivery_error,
            creado_en: format_utc_rfc3339(alert.created_at),
            actualizado_en: format_utc_rfc3339(alert.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
pub struct AlertListResponse {
    pub alertas: Vec<AlertResponse>,
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
    limite: Option<u32>,
}

/// Alert history with delivery status, newest first.
async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
    Query(params): Query<AlertQuery>,
) -> Result<Json<AlertListResponse>> {
    let limit = params
        .limite
        .unwrap_or(DEFAULT_ALERT_LIMIT)
        .clamp(1, MAX_ALERT_LIMIT);

    let alertas = state
        .db
        .list_alerts(usuario_id, limit)
        .await?
        .into_iter()
        .map(AlertResponse::from)
        .collect();

    Ok(Json(AlertListResponse { alertas }))
}
