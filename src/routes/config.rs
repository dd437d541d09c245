// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Threshold configuration routes.
//!
//! The store persists whatever it is given, so range ordering is checked
//! here on the merged configuration before every write.

use crate::error::{AppError, Result};
use crate::models::{ThresholdConfig, ThresholdUpdate};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_FREQUENCY_MINUTES: u32 = 5;
const DEFAULT_TIMEZONE: &str = "America/Mexico_City";
const DEFAULT_LOCALE: &str = "es";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/config/{usuario_id}",
        get(get_config).post(create_config).put(update_config),
    )
}

/// Threshold configuration as exchanged with the app.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
pub struct ThresholdResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub usuario_id: u64,
    pub hipo_min: f64,
    pub normal_min: f64,
    pub normal_max: f64,
    pub hiper_max: f64,
    pub frecuencia_medicion: u32,
    pub notificaciones: bool,
    pub zona_horaria: String,
    pub idioma: String,
    pub paciente_sensor_id: Option<String>,
    pub creado_en: String,
    pub actualizado_en: String,
}

impl From<ThresholdConfig> for ThresholdResponse {
    fn from(config: ThresholdConfig) -> Self {
        Self {
            usuario_id: config.user_id,
            hipo_min: config.hipo_min,
            normal_min: config.normal_min,
            normal_max: config.normal_max,
            hiper_max: config.hiper_max,
            frecuencia_medicion: config.measurement_frequency_minutes,
            notificaciones: config.notifications_enabled,
            zona_horaria: config.timezone,
            idioma: config.locale,
            paciente_sensor_id: config.sensor_patient_id,
            creado_en: format_utc_rfc3339(config.created_at),
            actualizado_en: format_utc_rfc3339(config.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateThresholdsRequest {
    #[validate(range(min = 20.0, max = 600.0))]
    pub hipo_min: f64,
    #[validate(range(min = 20.0, max = 600.0))]
    pub normal_min: f64,
    #[validate(range(min = 20.0, max = 600.0))]
    pub normal_max: f64,
    #[validate(range(min = 20.0, max = 600.0))]
    pub hiper_max: f64,
    #[validate(range(min = 1, max = 1440))]
    pub frecuencia_medicion: Option<u32>,
    pub notificaciones: Option<bool>,
    #[validate(length(min = 1, max = 64))]
    pub zona_horaria: Option<String>,
    #[validate(length(min = 2, max = 10))]
    pub idioma: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub paciente_sensor_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateThresholdsRequest {
    #[validate(range(min = 20.0, max = 600.0))]
    pub hipo_min: Option<f64>,
    #[validate(range(min = 20.0, max = 600.0))]
    pub normal_min: Option<f64>,
    #[validate(range(min = 20.0, max = 600.0))]
    pub normal_max: Option<f64>,
    #[validate(range(min = 20.0, max = 600.0))]
    pub hiper_max: Option<f64>,
    #[validate(range(min = 1, max = 1440))]
    pub frecuencia_medicion: Option<u32>,
    pub notificaciones: Option<bool>,
    #[validate(length(min = 1, max = 64))]
    pub zona_horaria: Option<String>,
    #[validate(length(min = 2, max = 10))]
    pub idioma: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub paciente_sensor_id: Option<String>,
}

impl From<UpdateThresholdsRequest> for ThresholdUpdate {
    fn from(req: UpdateThresholdsRequest) -> Self {
        Self {
            hipo_min: req.hipo_min,
            normal_min: req.normal_min,
            normal_max: req.normal_max,
            hiper_max: req.hiper_max,
            measurement_frequency_minutes: req.frecuencia_medicion,
            notifications_enabled: req.notificaciones,
            timezone: req.zona_horaria,
            locale: req.idioma,
            sensor_patient_id: req.paciente_sensor_id,
        }
    }
}

fn ensure_ordered(config: &ThresholdConfig) -> Result<()> {
    if config.is_ordered() {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Thresholds must satisfy hipoMin <= normalMin <= normalMax <= hiperMax \
         (got {} / {} / {} / {})",
        config.hipo_min, config.normal_min, config.normal_max, config.hiper_max
    )))
}

async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
) -> Result<Json<ThresholdResponse>> {
    let config = state.db.get_thresholds(usuario_id).await?.ok_or_else(|| {
        AppError::NotFound(format!("Thresholds for user {}", usuario_id))
    })?;

    Ok(Json(config.into()))
}

/// Save a user's first configuration. Fails with 409 if one exists.
async fn create_config(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
    Json(req): Json<CreateThresholdsRequest>,
) -> Result<(StatusCode, Json<ThresholdResponse>)> {
    req.validate()?;

    let now = chrono::Utc::now();
    let config = ThresholdConfig {
        user_id: usuario_id,
        hipo_min: req.hipo_min,
        normal_min: req.normal_min,
        normal_max: req.normal_max,
        hiper_max: req.hiper_max,
        measurement_frequency_minutes: req
            .frecuencia_medicion
            .unwrap_or(DEFAULT_FREQUENCY_MINUTES),
        notifications_enabled: req.notificaciones.unwrap_or(true),
        timezone: req
            .zona_horaria
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        locale: req.idioma.unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
        sensor_patient_id: req.paciente_sensor_id,
        created_at: now,
        updated_at: now,
    };
    ensure_ordered(&config)?;

    let saved = state.db.create_thresholds(&config).await?;
    tracing::info!(user_id = usuario_id, "Threshold configuration created");

    Ok((StatusCode::CREATED, Json(saved.into())))
}

/// Partial update. Ordering is checked against the merged result, which is
/// then written whole.
async fn update_config(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
    Json(req): Json<UpdateThresholdsRequest>,
) -> Result<Json<ThresholdResponse>> {
    req.validate()?;
    let update = ThresholdUpdate::from(req);

    let mut merged = state.db.get_thresholds(usuario_id).await?.ok_or_else(|| {
        AppError::NotFound(format!("Thresholds for user {}", usuario_id))
    })?;
    if !merged.apply(&update) {
        return Ok(Json(merged.into()));
    }
    ensure_ordered(&merged)?;

    let saved = state.db.replace_thresholds(&merged).await?;
    tracing::info!(user_id = usuario_id, "Threshold configuration updated");

    Ok(Json(saved.into()))
}
