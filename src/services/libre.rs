// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! LibreLinkUp client for reading sensor glucose values.
//!
//! Handles:
//! - Login with account credentials and regional redirects
//! - Auth ticket caching until shortly before expiry
//! - Re-login once when the API rejects a cached ticket
//! - Reading each user's linked patient from the shared connections
//!
//! One LibreLinkUp follower account can see several patients. Which patient
//! feeds a user is the `sensor_patient_id` of that user's threshold
//! configuration; users without one are not polled.

use crate::config::LibreCredentials;
use crate::db::{Database, ThresholdStore};
use crate::services::source::{ReadingSource, SourceError, SourceReading};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;

const GLOBAL_BASE_URL: &str = "https://api.libreview.io";
const PRODUCT: &str = "llu.android";
const CLIENT_VERSION: &str = "4.12.0";
/// Log in again this long before the ticket expires.
const TICKET_REFRESH_MARGIN_SECS: i64 = 5 * 60;
/// Format of `FactoryTimestamp` (UTC), e.g. `1/15/2024 10:30:00 AM`.
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// LibreLinkUp status codes in the response body.
const STATUS_OK: i32 = 0;
const STATUS_BAD_CREDENTIALS: i32 = 2;
const STATUS_TERMS_REQUIRED: i32 = 4;

/// Authenticated session with the LibreLinkUp API.
#[derive(Clone)]
struct LibreSession {
    base_url: String,
    token: String,
    /// SHA-256 (hex) of the account user ID, sent as `account-id`
    account_id: String,
    expires_at: DateTime<Utc>,
}

/// LibreLinkUp API client.
pub struct LibreLinkUpClient {
    http: reqwest::Client,
    base_url: String,
    credentials: LibreCredentials,
    db: Arc<dyn Database>,
    session: Mutex<Option<LibreSession>>,
}

impl LibreLinkUpClient {
    pub fn new(credentials: LibreCredentials, db: Arc<dyn Database>) -> Self {
        let base_url = credentials
            .region
            .as_deref()
            .map(regional_base_url)
            .unwrap_or_else(|| GLOBAL_BASE_URL.to_string());

        Self {
            http: reqwest::Client::new(),
            base_url,
            credentials,
            db,
            session: Mutex::new(None),
        }
    }

    /// LibreLinkUp patient linked to `user_id`, if any.
    async fn linked_patient(&self, user_id: u64) -> Result<Option<String>, SourceError> {
        let config = self.db.get_thresholds(user_id).await.map_err(|e| {
            SourceError::Unavailable(format!("Sensor link lookup failed: {}", e))
        })?;

        Ok(config.and_then(|c| c.sensor_patient_id))
    }

    /// Return the cached session, logging in if it is missing or about to expire.
    async fn session(&self) -> Result<LibreSession, SourceError> {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.as_ref() {
            let margin = chrono::Duration::seconds(TICKET_REFRESH_MARGIN_SECS);
            if Utc::now() + margin < session.expires_at {
                return Ok(session.clone());
            }
        }

        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    /// Log in, following at most one regional redirect.
    async fn login(&self) -> Result<LibreSession, SourceError> {
        let mut base_url = self.base_url.clone();

        for _ in 0..2 {
            let response = self
                .request(reqwest::Method::POST, &format!("{}/llu/auth/login", base_url))
                .json(&serde_json::json!({
                    "email": self.credentials.email,
                    "password": self.credentials.password,
                }))
                .send()
                .await
                .map_err(|e| SourceError::Unavailable(format!("Login request failed: {}", e)))?;

            let body: LoginResponse = check_response_json(response).await?;

            match parse_login(body, &base_url)? {
                LoginStep::Redirect(region) => {
                    tracing::info!(region = %region, "LibreLinkUp redirected login to region");
                    base_url = regional_base_url(&region);
                }
                LoginStep::Session(session) => {
                    tracing::info!("LibreLinkUp login successful");
                    return Ok(session);
                }
            }
        }

        Err(SourceError::Unavailable(
            "Too many LibreLinkUp region redirects".to_string(),
        ))
    }

    async fn fetch_connections(
        &self,
        session: &LibreSession,
    ) -> Result<Vec<Connection>, SourceError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("{}/llu/connections", session.base_url),
            )
            .bearer_auth(&session.token)
            .header("account-id", &session.account_id)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let body: ConnectionsResponse = check_response_json(response).await?;
        Ok(body.data)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("product", PRODUCT)
            .header("version", CLIENT_VERSION)
            .header("cache-control", "no-cache")
    }
}

#[async_trait]
impl ReadingSource for LibreLinkUpClient {
    async fn current_reading(&self, user_id: u64) -> Result<Option<SourceReading>, SourceError> {
        let Some(patient_id) = self.linked_patient(user_id).await? else {
            tracing::info!(user_id, "No LibreLinkUp patient linked to user, skipping poll");
            return Ok(None);
        };

        let session = self.session().await?;

        let connections = match self.fetch_connections(&session).await {
            Ok(connections) => connections,
            Err(SourceError::Auth(reason)) => {
                tracing::info!(
                    user_id,
                    reason = %reason,
                    "LibreLinkUp ticket rejected, logging in again"
                );
                self.invalidate_session().await;
                let session = self.session().await?;
                self.fetch_connections(&session).await?
            }
            Err(e) => return Err(e),
        };

        let reading = reading_for_patient(&connections, &patient_id);
        if matches!(reading, Ok(None)) {
            tracing::warn!(
                user_id,
                patient_id = %patient_id,
                "Linked patient has no current measurement on this LibreLinkUp account"
            );
        }
        reading
    }

    fn name(&self) -> &str {
        "librelinkup"
    }
}

// ─── Wire Types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: i32,
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(default)]
    redirect: bool,
    region: Option<String>,
    user: Option<LibreUser>,
    #[serde(rename = "authTicket")]
    auth_ticket: Option<AuthTicket>,
}

#[derive(Debug, Deserialize)]
struct LibreUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AuthTicket {
    token: String,
    /// Unix timestamp (seconds)
    expires: i64,
}

#[derive(Debug, Deserialize)]
struct ConnectionsResponse {
    #[serde(default)]
    data: Vec<Connection>,
}

#[derive(Debug, Clone, Deserialize)]
struct Connection {
    #[serde(rename = "patientId")]
    patient_id: String,
    #[serde(rename = "glucoseMeasurement")]
    glucose_measurement: Option<GlucoseMeasurement>,
}

#[derive(Debug, Clone, Deserialize)]
struct GlucoseMeasurement {
    #[serde(rename = "ValueInMgPerDl")]
    value_in_mg_per_dl: f64,
    #[serde(rename = "FactoryTimestamp")]
    factory_timestamp: String,
    #[serde(rename = "TrendArrow")]
    trend_arrow: Option<u8>,
}

impl GlucoseMeasurement {
    fn to_source_reading(&self) -> Result<SourceReading, SourceError> {
        if !self.value_in_mg_per_dl.is_finite() || self.value_in_mg_per_dl <= 0.0 {
            return Err(SourceError::InvalidData(format!(
                "Glucose value {} is not a valid measurement",
                self.value_in_mg_per_dl
            )));
        }

        Ok(SourceReading {
            value_mg_dl: self.value_in_mg_per_dl,
            recorded_at: parse_factory_timestamp(&self.factory_timestamp)?,
            trend: self.trend_arrow,
        })
    }
}

enum LoginStep {
    Redirect(String),
    Session(LibreSession),
}

// ─── Helpers ─────────────────────────────────────────────────────

fn regional_base_url(region: &str) -> String {
    format!("https://api-{}.libreview.io", region)
}

/// SHA-256 hex digest of the LibreLinkUp user ID.
fn account_id_hash(user_id: &str) -> String {
    hex::encode(Sha256::digest(user_id.as_bytes()))
}

/// Parse a `FactoryTimestamp`, which LibreLinkUp reports in UTC.
fn parse_factory_timestamp(raw: &str) -> Result<DateTime<Utc>, SourceError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SourceError::InvalidData(format!("Bad timestamp '{}': {}", raw, e)))
}

fn select_connection<'a>(
    connections: &'a [Connection],
    patient_id: &str,
) -> Option<&'a Connection> {
    connections.iter().find(|c| c.patient_id == patient_id)
}

/// Current measurement of `patient_id`; `None` if the patient is not shared
/// with this account or has no measurement yet.
fn reading_for_patient(
    connections: &[Connection],
    patient_id: &str,
) -> Result<Option<SourceReading>, SourceError> {
    select_connection(connections, patient_id)
        .and_then(|c| c.glucose_measurement.as_ref())
        .map(GlucoseMeasurement::to_source_reading)
        .transpose()
}

fn parse_login(body: LoginResponse, base_url: &str) -> Result<LoginStep, SourceError> {
    match body.status {
        STATUS_OK => {}
        STATUS_BAD_CREDENTIALS => {
            return Err(SourceError::Auth("Invalid LibreLinkUp credentials".to_string()))
        }
        STATUS_TERMS_REQUIRED => {
            return Err(SourceError::Auth(
                "Terms of use must be accepted in the LibreLinkUp app".to_string(),
            ))
        }
        other => {
            return Err(SourceError::Unavailable(format!(
                "Unexpected LibreLinkUp login status {}",
                other
            )))
        }
    }

    let data = body
        .data
        .ok_or_else(|| SourceError::InvalidData("Login response without data".to_string()))?;

    if data.redirect {
        let region = data
            .region
            .ok_or_else(|| SourceError::InvalidData("Redirect without region".to_string()))?;
        return Ok(LoginStep::Redirect(region));
    }

    let (Some(user), Some(ticket)) = (data.user, data.auth_ticket) else {
        return Err(SourceError::InvalidData(
            "Login response missing user or auth ticket".to_string(),
        ));
    };

    Ok(LoginStep::Session(LibreSession {
        base_url: base_url.to_string(),
        token: ticket.token,
        account_id: account_id_hash(&user.id),
        expires_at: DateTime::from_timestamp(ticket.expires, 0).unwrap_or_default(),
    }))
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, SourceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        return Err(match status.as_u16() {
            401 | 403 => SourceError::Auth(format!("HTTP {}", status)),
            429 => {
                tracing::warn!("LibreLinkUp rate limit hit (429)");
                SourceError::Unavailable("Rate limited".to_string())
            }
            _ => SourceError::Unavailable(format!("HTTP {}: {}", status, body)),
        });
    }

    response
        .json()
        .await
        .map_err(|e| SourceError::InvalidData(format!("JSON parse error: {}", e)))
}
