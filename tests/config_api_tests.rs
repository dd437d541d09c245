// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Threshold configuration endpoints and their validation boundary.

use axum::http::StatusCode;
use glucose_monitor::db::ThresholdStore;
use glucose_monitor::services::classify;
use serde_json::json;

mod common;
use common::{body_json, create_test_app, get_request, json_request, reference_thresholds};

const USER: u64 = 55;

fn config_uri() -> String {
    format!("/config/{}", USER)
}

fn valid_body() -> serde_json::Value {
    json!({
        "hipoMin": 60,
        "normalMin": 70,
        "normalMax": 140,
        "hiperMax": 180
    })
}

#[tokio::test]
async fn test_create_then_get() {
    let app = create_test_app();

    let response = app
        .request(json_request("POST", &config_uri(), valid_body()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["usuarioId"], USER);
    assert_eq!(body["frecuenciaMedicion"], 5);
    assert_eq!(body["notificaciones"], true);
    assert_eq!(body["idioma"], "es");

    let response = app.request(get_request(&config_uri())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["hipoMin"], 60.0);
    assert_eq!(body["hiperMax"], 180.0);
}

#[tokio::test]
async fn test_get_missing_is_404() {
    let app = create_test_app();

    let response = app.request(get_request(&config_uri())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_second_create_conflicts() {
    let app = create_test_app();

    app.request(json_request("POST", &config_uri(), valid_body()))
        .await;
    let response = app
        .request(json_request("POST", &config_uri(), valid_body()))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_out_of_order_thresholds_rejected_before_store() {
    let app = create_test_app();

    let response = app
        .request(json_request(
            "POST",
            &config_uri(),
            json!({
                "hipoMin": 80,
                "normalMin": 70,
                "normalMax": 140,
                "hiperMax": 180
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing reached the store
    assert!(app.db.get_thresholds(USER).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_does_not_check_ordering() {
    let app = create_test_app();

    let mut unordered = reference_thresholds(USER);
    unordered.hipo_min = 80.0;
    unordered.normal_min = 70.0;

    // Direct store writes bypass the HTTP validation
    let saved = app.db.create_thresholds(&unordered).await.unwrap();
    assert_eq!(saved.hipo_min, 80.0);

    // Classification still follows the fixed branch order: red first
    let result = classify(75.0, Some(&saved));
    assert_eq!(result.priority, Some(3));
}

#[tokio::test]
async fn test_bounds_are_validated() {
    let app = create_test_app();

    let response = app
        .request(json_request(
            "POST",
            &config_uri(),
            json!({
                "hipoMin": 10,
                "normalMin": 70,
                "normalMax": 140,
                "hiperMax": 180
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = valid_body();
    body["frecuenciaMedicion"] = json!(0);
    let response = app.request(json_request("POST", &config_uri(), body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_partial_update_merges() {
    let app = create_test_app();
    app.request(json_request("POST", &config_uri(), valid_body()))
        .await;

    let response = app
        .request(json_request(
            "PUT",
            &config_uri(),
            json!({ "normalMax": 150, "idioma": "en", "notificaciones": false }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["normalMax"], 150.0);
    assert_eq!(body["normalMin"], 70.0);
    assert_eq!(body["idioma"], "en");
    assert_eq!(body["notificaciones"], false);
}

#[tokio::test]
async fn test_update_checks_merged_ordering() {
    let app = create_test_app();
    app.request(json_request("POST", &config_uri(), valid_body()))
        .await;

    // 200 is valid on its own but above hiperMax once merged
    let response = app
        .request(json_request("PUT", &config_uri(), json!({ "normalMax": 200 })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stored = app.db.get_thresholds(USER).await.unwrap().unwrap();
    assert_eq!(stored.normal_max, 140.0);
}

#[tokio::test]
async fn test_update_missing_is_404() {
    let app = create_test_app();

    let response = app
        .request(json_request("PUT", &config_uri(), json!({ "normalMax": 150 })))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_snake_case_fields_are_not_accepted() {
    let app = create_test_app();

    let response = app
        .request(json_request(
            "POST",
            &config_uri(),
            json!({
                "hipo_min": 60,
                "normal_min": 70,
                "normal_max": 140,
                "hiper_max": 180
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_sensor_patient_link_round_trips() {
    let app = create_test_app();

    let mut body = valid_body();
    body["pacienteSensorId"] = json!("patient-a");
    let response = app.request(json_request("POST", &config_uri(), body)).await;
    assert_eq!(body_json(response).await["pacienteSensorId"], "patient-a");

    let response = app
        .request(json_request(
            "PUT",
            &config_uri(),
            json!({ "pacienteSensorId": "patient-b" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.db.get_thresholds(USER).await.unwrap().unwrap();
    assert_eq!(stored.sensor_patient_id.as_deref(), Some("patient-b"));
}

#[tokio::test]
async fn test_concurrent_updates_keep_thresholds_ordered() {
    let app = create_test_app();
    app.request(json_request("POST", &config_uri(), valid_body()))
        .await;

    // Both requests read the stored 60/70/140/180 before either writes.
    // Each is ordered against that snapshot; applied together they would
    // leave normalMax above hiperMax.
    app.db.set_yield_on_reads(true);
    let (lower_ceiling, raise_normal) = tokio::join!(
        app.request(json_request("PUT", &config_uri(), json!({ "hiperMax": 150 }))),
        app.request(json_request("PUT", &config_uri(), json!({ "normalMax": 170 }))),
    );
    app.db.set_yield_on_reads(false);

    assert_eq!(lower_ceiling.status(), StatusCode::OK);
    assert_eq!(raise_normal.status(), StatusCode::OK);

    let stored = app.db.get_thresholds(USER).await.unwrap().unwrap();
    assert!(
        stored.is_ordered(),
        "stored {} / {} / {} / {}",
        stored.hipo_min,
        stored.normal_min,
        stored.normal_max,
        stored.hiper_max
    );
}
