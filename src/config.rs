// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Sensor and push credentials are optional: without LibreLinkUp credentials
//! monitoring sessions still run but every tick yields no reading, and without
//! an Expo access token pushes are sent unauthenticated.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::pipeline::AlertPolicy;
use crate::services::retry::RetryPolicy;

/// Default polling interval for monitoring sessions (5 minutes).
pub const DEFAULT_INTERVAL_MS: u64 = 300_000;
/// Smallest interval a client may request.
pub const MIN_INTERVAL_MS: u64 = 10_000;
/// Largest interval a client may request (one day).
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StorageBackend::Firestore),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// LibreLinkUp account used to read sensor values.
#[derive(Debug, Clone)]
pub struct LibreCredentials {
    pub email: String,
    pub password: String,
    /// Regional API host suffix (e.g. "eu", "us"); `None` uses the global host.
    pub region: Option<String>,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Mobile/web frontend origin allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Persistence backend
    pub storage: StorageBackend,
    /// Sensor account (optional)
    pub libre: Option<LibreCredentials>,
    /// Expo push endpoint
    pub expo_push_url: String,
    /// Expo access token for enhanced push security (optional)
    pub expo_access_token: Option<String>,
    /// Interval used when a start request does not name one
    pub default_interval_ms: u64,
    /// Which classifications produce alerts
    pub alert_policy: AlertPolicy,
    /// Retry policy for sensor polls and push sends
    pub retry: RetryPolicy,
}

impl Config {
    /// Config for tests: in-memory storage, no external credentials.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:8081".to_string(),
            gcp_project_id: "test-project".to_string(),
            storage: StorageBackend::Memory,
            libre: None,
            expo_push_url: crate::services::push::EXPO_PUSH_URL.to_string(),
            expo_access_token: None,
            default_interval_ms: DEFAULT_INTERVAL_MS,
            alert_policy: AlertPolicy::NonNormal,
            retry: RetryPolicy::none(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let libre = match (env::var("LIBRE_EMAIL"), env::var("LIBRE_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(LibreCredentials {
                email: email.trim().to_string(),
                password: password.trim().to_string(),
                region: env::var("LIBRE_REGION").ok().filter(|r| !r.is_empty()),
            }),
            (Ok(_), Err(_)) => return Err(ConfigError::Missing("LIBRE_PASSWORD")),
            _ => None,
        };

        let default_interval_ms = parse_or("DEFAULT_INTERVAL_MS", DEFAULT_INTERVAL_MS)?;
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&default_interval_ms) {
            return Err(ConfigError::Invalid(
                "DEFAULT_INTERVAL_MS",
                default_interval_ms.to_string(),
            ));
        }

        let max_attempts: u32 = parse_or("RETRY_MAX_ATTEMPTS", 1)?;
        let initial_backoff_ms: u64 = parse_or("RETRY_INITIAL_BACKOFF_MS", 500)?;

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            storage: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,
            libre,
            expo_push_url: env::var("EXPO_PUSH_URL")
                .unwrap_or_else(|_| crate::services::push::EXPO_PUSH_URL.to_string()),
            expo_access_token: env::var("EXPO_ACCESS_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            default_interval_ms,
            alert_policy: env::var("ALERT_POLICY")
                .unwrap_or_else(|_| "non_normal".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::Invalid("ALERT_POLICY", env::var("ALERT_POLICY").unwrap_or_default())
                })?,
            retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(initial_backoff_ms)),
        })
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("LIBRE_EMAIL", "patient@example.com");
        env::set_var("LIBRE_PASSWORD", "secret");
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("RETRY_MAX_ATTEMPTS", "3");

        let config = Config::from_env().expect("Config should load");

        let libre = config.libre.expect("LibreLinkUp credentials");
        assert_eq!(libre.email, "patient@example.com");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.default_interval_ms, DEFAULT_INTERVAL_MS);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "Firestore".parse::<StorageBackend>().unwrap(),
            StorageBackend::Firestore
        );
        assert!("mysql".parse::<StorageBackend>().is_err());
    }
}
