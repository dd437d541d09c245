// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Glucose Monitor API Server
//!
//! Stores glucose readings, classifies them against per-user thresholds and
//! pushes alerts to the user's devices.

use glucose_monitor::{
    config::{Config, StorageBackend},
    db::{Database, FirestoreDb, MemoryDb},
    services::{ExpoPushClient, LibreLinkUpClient, PushProvider, ReadingSource, UnavailableSource},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Glucose Monitor API");

    let db: Arc<dyn Database> = match config.storage {
        StorageBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryDb::new())
        }
    };

    let source: Arc<dyn ReadingSource> = match &config.libre {
        Some(credentials) => {
            tracing::info!(
                region = credentials.region.as_deref().unwrap_or("global"),
                "LibreLinkUp sensor source configured"
            );
            Arc::new(LibreLinkUpClient::new(credentials.clone(), db.clone()))
        }
        None => {
            tracing::warn!("No sensor credentials; monitoring ticks will find no readings");
            Arc::new(UnavailableSource)
        }
    };

    let push: Arc<dyn PushProvider> = Arc::new(ExpoPushClient::new(
        config.expo_push_url.clone(),
        config.expo_access_token.clone(),
    ));

    let state = Arc::new(AppState::new(config.clone(), db, source, push));
    let scheduler = state.scheduler.clone();

    let app = glucose_monitor::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Monitoring sessions are in memory only; they do not survive a restart
    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["glucose_monitor=debug", "info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry().with(filter).with(format).init();
}
