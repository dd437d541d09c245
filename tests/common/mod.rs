// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, Utc};
use glucose_monitor::config::Config;
use glucose_monitor::db::{FirestoreDb, MemoryDb};
use glucose_monitor::models::ThresholdConfig;
use glucose_monitor::routes::create_router;
use glucose_monitor::services::push::{PushTicketDetails, EXPO_MAX_BATCH};
use glucose_monitor::services::{
    PushError, PushMessage, PushProvider, PushTicket, ReadingSource, SourceError, SourceReading,
};
use glucose_monitor::AppState;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

type ScriptedResult = Result<Option<SourceReading>, SourceError>;

/// Reading source that replays scripted results, then reports nothing.
///
/// Each call can be made slow, either per scripted entry or for every call,
/// and the source records how many calls were running at the same time.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<(Duration, ScriptedResult)>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn push_value(&self, value_mg_dl: f64, recorded_at: DateTime<Utc>) {
        self.push_slow_value(value_mg_dl, recorded_at, Duration::ZERO);
    }

    /// Script a value that takes `delay` to arrive.
    pub fn push_slow_value(&self, value_mg_dl: f64, recorded_at: DateTime<Utc>, delay: Duration) {
        let reading = SourceReading {
            value_mg_dl,
            recorded_at,
            trend: Some(3),
        };
        self.script
            .lock()
            .unwrap()
            .push_back((delay, Ok(Some(reading))));
    }

    pub fn push_result(&self, result: ScriptedResult) {
        self.script
            .lock()
            .unwrap()
            .push_back((Duration::ZERO, result));
    }

    /// Extra delay added to every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls currently waiting on their delay.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most calls ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadingSource for ScriptedSource {
    async fn current_reading(&self, _user_id: u64) -> Result<Option<SourceReading>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let (delay, result) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((Duration::ZERO, Ok(None)));
        let delay = delay + *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Push provider that records every batch instead of sending it.
pub struct RecordingPush {
    batches: Mutex<Vec<Vec<PushMessage>>>,
    max_batch: usize,
    unregistered: Mutex<HashSet<String>>,
    fail_batches: Mutex<bool>,
}

impl Default for RecordingPush {
    fn default() -> Self {
        Self::with_batch_size(EXPO_MAX_BATCH)
    }
}

#[allow(dead_code)]
impl RecordingPush {
    pub fn with_batch_size(max_batch: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            max_batch,
            unregistered: Mutex::new(HashSet::new()),
            fail_batches: Mutex::new(false),
        }
    }

    /// Report this token as `DeviceNotRegistered` from now on.
    pub fn unregister(&self, token: &str) {
        self.unregistered.lock().unwrap().insert(token.to_string());
    }

    /// Make every batch fail at the transport level.
    pub fn fail_all_batches(&self) {
        *self.fail_batches.lock().unwrap() = true;
    }

    pub fn batches(&self) -> Vec<Vec<PushMessage>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn message_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl PushProvider for RecordingPush {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        self.batches.lock().unwrap().push(messages.to_vec());

        if *self.fail_batches.lock().unwrap() {
            return Err(PushError::Transport("connection reset".to_string()));
        }

        let unregistered = self.unregistered.lock().unwrap();
        Ok(messages
            .iter()
            .map(|m| {
                if unregistered.contains(&m.to) {
                    PushTicket::Error {
                        message: format!("{} is not a registered push notification recipient", m.to),
                        details: Some(PushTicketDetails {
                            error: Some("DeviceNotRegistered".to_string()),
                        }),
                    }
                } else {
                    PushTicket::Ok {
                        id: Some(uuid::Uuid::new_v4().to_string()),
                    }
                }
            })
            .collect())
    }
}

/// Application wired to in-memory collaborators.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: MemoryDb,
    pub source: Arc<ScriptedSource>,
    pub push: Arc<RecordingPush>,
}

#[allow(dead_code)]
impl TestApp {
    /// Send a request through the router.
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt; // for oneshot

        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Create a test app with in-memory storage and fake sensor/push services.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default(), RecordingPush::default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config, push: RecordingPush) -> TestApp {
    let db = MemoryDb::new();
    let source = Arc::new(ScriptedSource::default());
    let push = Arc::new(push);

    let state = Arc::new(AppState::new(
        config,
        Arc::new(db.clone()),
        source.clone(),
        push.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        source,
        push,
    }
}

/// Thresholds from the reference scenario: 60 / 70 / 140 / 180.
#[allow(dead_code)]
pub fn reference_thresholds(user_id: u64) -> ThresholdConfig {
    let now = Utc::now();
    ThresholdConfig {
        user_id,
        hipo_min: 60.0,
        normal_min: 70.0,
        normal_max: 140.0,
        hiper_max: 180.0,
        measurement_frequency_minutes: 5,
        notifications_enabled: true,
        timezone: "America/Mexico_City".to_string(),
        locale: "es".to_string(),
        sensor_patient_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// Build a JSON request.
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
