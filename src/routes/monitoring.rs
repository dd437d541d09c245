// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Glucose readings and monitoring session routes.

use crate::config::{MAX_INTERVAL_MS, MIN_INTERVAL_MS};
use crate::error::{AppError, Result};
use crate::models::{Classification, GlucoseUnit, Reading, ReadingMethod, ReadingUpdate};
use crate::services::pipeline::{CycleOutcome, Evaluation};
use crate::services::scheduler::{SessionInfo, StartOutcome, TickReport};
use crate::time_utils::{format_utc_rfc3339, parse_rfc3339_utc};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Source label for readings entered in the app.
const MANUAL_SOURCE: &str = "app";
const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/niveles-glucosa", post(create_reading))
        .route("/niveles-glucosa/{usuario_id}", get(list_readings))
        .route(
            "/niveles-glucosa/{usuario_id}/{lectura_id}",
            put(update_reading).delete(delete_reading),
        )
        .route("/niveles-glucosa/monitoreo/iniciar", post(start_monitoring))
        .route("/niveles-glucosa/monitoreo/detener", post(stop_monitoring))
        .route(
            "/niveles-glucosa/monitoreo/estado/{usuario_id}",
            get(monitoring_status),
        )
        .route(
            "/niveles-glucosa/monitoreo/ultima-lectura/{usuario_id}",
            get(latest_reading),
        )
}

// ─── Response types ──────────────────────────────────────────

/// A stored reading as returned to the app.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct ReadingResponse {
    pub id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub usuario_id: u64,
    pub valor: f64,
    pub unidad: String,
    /// Value converted to mg/dL
    pub valor_mg_dl: f64,
    pub metodo: String,
    pub fuente: String,
    pub fecha_hora: String,
    pub etiqueta: Option<String>,
    pub notas: Option<String>,
    pub tendencia: Option<u8>,
}

impl From<&Reading> for ReadingResponse {
    fn from(reading: &Reading) -> Self {
        Self {
            id: reading.id.clone(),
            usuario_id: reading.user_id,
            valor: reading.value,
            unidad: reading.unit.label().to_string(),
            valor_mg_dl: reading.value_mg_dl(),
            metodo: match reading.method {
                ReadingMethod::Manual => "manual".to_string(),
                ReadingMethod::Sensor => "sensor".to_string(),
            },
            fuente: reading.source.clone(),
            fecha_hora: format_utc_rfc3339(reading.recorded_at),
            etiqueta: reading.label.clone(),
            notas: reading.notes.clone(),
            tendencia: reading.trend,
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
pub struct ClassificationResponse {
    pub tipo: String,
    pub comparador: Option<String>,
    pub prioridad: Option<u8>,
}

impl From<&Classification> for ClassificationResponse {
    fn from(classification: &Classification) -> Self {
        Self {
            tipo: classification.kind.as_str().to_string(),
            comparador: classification.comparator.map(|c| c.as_str().to_string()),
            prioridad: classification.priority,
        }
    }
}

/// Result of one monitoring cycle.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct CycleResponse {
    /// "sin_lectura", "duplicada", "procesada" or "error"
    pub estado: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lectura: Option<ReadingResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clasificacion: Option<ClassificationResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerta_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notificaciones_enviadas: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleResponse {
    fn empty(estado: &str) -> Self {
        Self {
            estado: estado.to_string(),
            lectura: None,
            clasificacion: None,
            alerta_id: None,
            notificaciones_enviadas: None,
            error: None,
        }
    }

    fn with_evaluation(mut self, evaluation: &Evaluation) -> Self {
        self.clasificacion = Some(ClassificationResponse::from(&evaluation.classification));
        self.alerta_id = evaluation.alert_id.clone();
        self.notificaciones_enviadas = evaluation.dispatch.as_ref().map(|d| d.sent);
        self
    }
}

impl From<&TickReport> for CycleResponse {
    fn from(report: &TickReport) -> Self {
        match report {
            TickReport::Completed(CycleOutcome::NoReading) => Self::empty("sin_lectura"),
            TickReport::Completed(CycleOutcome::Duplicate { reading }) => Self {
                lectura: Some(ReadingResponse::from(reading)),
                ..Self::empty("duplicada")
            },
            TickReport::Completed(CycleOutcome::Processed {
                reading,
                evaluation,
                ..
            }) => Self {
                lectura: Some(ReadingResponse::from(reading)),
                ..Self::empty("procesada")
            }
            .with_evaluation(evaluation),
            TickReport::Failed { reason } => Self {
                error: Some(reason.clone()),
                ..Self::empty("error")
            },
        }
    }
}

/// State of a user's monitoring session.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatusResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub usuario_id: u64,
    pub activo: bool,
    /// Polling interval in milliseconds
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub intervalo: Option<u64>,
    pub iniciado_en: Option<String>,
}

impl MonitoringStatusResponse {
    fn from_session(user_id: u64, session: Option<&SessionInfo>) -> Self {
        Self {
            usuario_id: user_id,
            activo: session.is_some(),
            intervalo: session.map(|s| s.interval.as_millis() as u64),
            iniciado_en: session.map(|s| format_utc_rfc3339(s.started_at)),
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct StartMonitoringResponse {
    pub mensaje: String,
    /// True when the session already existed and nothing was started
    pub ya_activo: bool,
    #[serde(flatten)]
    pub sesion: MonitoringStatusResponse,
    /// Result of the immediate first cycle (absent if already running)
    pub primer_ciclo: Option<CycleResponse>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct StopMonitoringResponse {
    pub mensaje: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub usuario_id: u64,
    pub estaba_activo: bool,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
pub struct LatestReadingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lectura: Option<ReadingResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensaje: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct CreateReadingResponse {
    pub lectura: ReadingResponse,
    pub clasificacion: ClassificationResponse,
    pub alerta_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
pub struct ReadingListResponse {
    pub lecturas: Vec<ReadingResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(feature = "binding-generation", ts(export, export_to = "app/src/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct DeleteReadingResponse {
    pub mensaje: String,
    pub lectura_id: String,
}

// ─── Monitoring sessions ─────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartMonitoringRequest {
    pub usuario_id: u64,
    /// Polling interval in milliseconds
    #[validate(range(min = MIN_INTERVAL_MS, max = MAX_INTERVAL_MS))]
    pub intervalo: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMonitoringRequest {
    pub usuario_id: u64,
}

/// Start polling the sensor for a user. Idempotent.
async fn start_monitoring(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartMonitoringRequest>,
) -> Result<Json<StartMonitoringResponse>> {
    req.validate()?;

    let interval = req.intervalo.map(Duration::from_millis);
    let response = match state.scheduler.start(req.usuario_id, interval).await {
        StartOutcome::Started {
            session,
            first_cycle,
        } => StartMonitoringResponse {
            mensaje: "Monitoreo iniciado".to_string(),
            ya_activo: false,
            sesion: MonitoringStatusResponse::from_session(req.usuario_id, Some(&session)),
            primer_ciclo: Some(CycleResponse::from(&first_cycle)),
        },
        StartOutcome::AlreadyRunning(session) => StartMonitoringResponse {
            mensaje: "El monitoreo ya estaba activo".to_string(),
            ya_activo: true,
            sesion: MonitoringStatusResponse::from_session(req.usuario_id, Some(&session)),
            primer_ciclo: None,
        },
    };

    Ok(Json(response))
}

/// Stop polling for a user. Stopping an idle user is not an error.
async fn stop_monitoring(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StopMonitoringRequest>,
) -> Json<StopMonitoringResponse> {
    let was_running = state.scheduler.stop(req.usuario_id);

    let mensaje = if was_running {
        "Monitoreo detenido"
    } else {
        "No había monitoreo activo"
    };

    Json(StopMonitoringResponse {
        mensaje: mensaje.to_string(),
        usuario_id: req.usuario_id,
        estaba_activo: was_running,
    })
}

async fn monitoring_status(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
) -> Json<MonitoringStatusResponse> {
    let session = state.scheduler.session(usuario_id);
    Json(MonitoringStatusResponse::from_session(
        usuario_id,
        session.as_ref(),
    ))
}

async fn latest_reading(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
) -> Result<Json<LatestReadingResponse>> {
    let response = match state.db.latest_reading(usuario_id).await? {
        Some(reading) => LatestReadingResponse {
            lectura: Some(ReadingResponse::from(&reading)),
            mensaje: None,
        },
        None => LatestReadingResponse {
            lectura: None,
            mensaje: Some("No hay lecturas registradas".to_string()),
        },
    };

    Ok(Json(response))
}

// ─── Readings ────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReadingRequest {
    pub usuario_id: u64,
    #[validate(range(exclusive_min = 0.0))]
    pub valor: f64,
    #[serde(default)]
    pub unidad: GlucoseUnit,
    #[validate(length(max = 64))]
    pub etiqueta: Option<String>,
    #[validate(length(max = 500))]
    pub notas: Option<String>,
    /// RFC3339; defaults to now
    pub fecha_hora: Option<String>,
}

/// Record a manual reading and run it through classification.
async fn create_reading(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateReadingRequest>,
) -> Result<(StatusCode, Json<CreateReadingResponse>)> {
    req.validate()?;

    let recorded_at = match req.fecha_hora.as_deref() {
        Some(raw) => parse_rfc3339_utc(raw).ok_or_else(|| {
            AppError::BadRequest("Invalid 'fechaHora': must be RFC3339 datetime".to_string())
        })?,
        None => chrono::Utc::now(),
    };

    let mut reading = Reading::new(
        req.usuario_id,
        req.valor,
        req.unidad,
        ReadingMethod::Manual,
        MANUAL_SOURCE,
        recorded_at,
    );
    reading.label = req.etiqueta;
    reading.notes = req.notas;

    if !reading.has_valid_value() {
        return Err(AppError::BadRequest(
            "Glucose value must be a positive number".to_string(),
        ));
    }

    if !state.db.insert_reading(&reading).await? {
        return Err(AppError::Conflict(format!(
            "A reading at {} already exists",
            format_utc_rfc3339(recorded_at)
        )));
    }

    tracing::info!(
        user_id = reading.user_id,
        reading_id = %reading.id,
        "Manual reading stored"
    );

    let evaluation = state.pipeline.evaluate(&reading).await;

    Ok((
        StatusCode::CREATED,
        Json(CreateReadingResponse {
            lectura: ReadingResponse::from(&reading),
            clasificacion: ClassificationResponse::from(&evaluation.classification),
            alerta_id: evaluation.alert_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default = "default_limit")]
    limite: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

/// Most recent readings first.
async fn list_readings(
    State(state): State<Arc<AppState>>,
    Path(usuario_id): Path<u64>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ReadingListResponse>> {
    let limit = params.limite.clamp(1, MAX_LIMIT);
    let readings = state.db.list_readings(usuario_id, limit).await?;

    let lecturas: Vec<ReadingResponse> = readings.iter().map(ReadingResponse::from).collect();
    Ok(Json(ReadingListResponse {
        total: lecturas.len(),
        lecturas,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReadingRequest {
    #[validate(range(exclusive_min = 0.0))]
    pub valor: Option<f64>,
    #[validate(length(max = 64))]
    pub etiqueta: Option<String>,
    #[validate(length(max = 500))]
    pub notas: Option<String>,
}

/// Edit value, label or notes. Alerts already raised are not revisited.
async fn update_reading(
    State(state): State<Arc<AppState>>,
    Path((usuario_id, lectura_id)): Path<(u64, String)>,
    Json(req): Json<UpdateReadingRequest>,
) -> Result<Json<ReadingResponse>> {
    req.validate()?;

    let update = ReadingUpdate {
        value: req.valor,
        label: req.etiqueta,
        notes: req.notas,
    };
    let reading = state
        .db
        .update_reading(usuario_id, &lectura_id, &update)
        .await?;

    Ok(Json(ReadingResponse::from(&reading)))
}

async fn delete_reading(
    State(state): State<Arc<AppState>>,
    Path((usuario_id, lectura_id)): Path<(u64, String)>,
) -> Result<Json<DeleteReadingResponse>> {
    if !state.db.delete_reading(usuario_id, &lectura_id).await? {
        return Err(AppError::NotFound(format!("Reading {}", lectura_id)));
    }

    tracing::info!(user_id = usuario_id, reading_id = %lectura_id, "Reading deleted");
    Ok(Json(DeleteReadingResponse {
        mensaje: "Lectura eliminada".to_string(),
        lectura_id,
    }))
}
