//! End-to-end HTTP checks against a local server on the published port.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use nvcf_preflight::{
    CheckConfig, InferenceReport, InferenceTarget, PreflightError, ReplyBody, SmokeTest,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct AppState {
    health_calls: Arc<AtomicUsize>,
    ready_after: usize,
    received: Arc<Mutex<Option<Value>>>,
}

async fn ready(State(state): State<AppState>) -> StatusCode {
    let calls = state.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if calls > state.ready_after {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn infer(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    *state.received.lock() = Some(body);
    Json(json!({"y": 2}))
}

async fn stream() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        "data: one\n\ndata: two\n\n",
    )
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"late": true}))
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded")
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/v2/health/ready", get(ready))
        .route("/infer", post(infer))
        .route("/stream", post(stream))
        .route("/broken", post(broken))
        .route("/slow", post(slow))
        .with_state(state)
}

async fn start(ready_after: usize) -> (AppState, u16) {
    let (listener, port) = common::listener().await;
    let state = AppState {
        ready_after,
        ..AppState::default()
    };
    common::serve_http(listener, app(state.clone()));
    (state, port)
}

#[tokio::test]
async fn test_healthy_without_inference() {
    let (state, port) = start(2).await;
    let runtime = common::runtime();
    let config = CheckConfig::new("echo:http", 8000).with_wait_seconds(5);

    let mut out = Vec::new();
    let report = SmokeTest::new(runtime.clone(), common::settings(port))
        .run_until(&config, &mut out, std::future::pending())
        .await
        .expect("check passes");

    assert_eq!(report.health.attempts, 3);
    assert_eq!(state.health_calls.load(Ordering::SeqCst), 3);
    assert!(report.inference.is_none());
    assert_eq!(runtime.container_count(), 0);

    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.contains("Looking for health signal at"));
    assert!(printed.contains("Health Check succeeded!"));
    assert!(!printed.contains("HTTP inference test succeeded!"));
}

#[tokio::test]
async fn test_json_inference() {
    let (state, port) = start(0).await;
    let runtime = common::runtime();
    let config = CheckConfig::new("echo:http", 8000)
        .with_wait_seconds(5)
        .with_inference(InferenceTarget::http("/infer", r#"{"x": 1}"#).expect("payload"));

    let mut out = Vec::new();
    let report = SmokeTest::new(runtime.clone(), common::settings(port))
        .run_until(&config, &mut out, std::future::pending())
        .await
        .expect("check passes");

    assert_eq!(*state.received.lock(), Some(json!({"x": 1})));
    let Some(InferenceReport::Http(reply)) = &report.inference else {
        panic!("expected HTTP inference report");
    };
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, ReplyBody::Json(json!({"y": 2})));

    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.contains("Server's response status: 200 OK"));
    assert!(printed.contains("\"y\": 2"));
    assert!(printed.contains("HTTP inference test succeeded!"));
    assert_eq!(runtime.container_count(), 0);
}

#[tokio::test]
async fn test_streaming_inference_relays_lines() {
    let (_state, port) = start(0).await;
    let config = CheckConfig::new("echo:http", 8000)
        .with_wait_seconds(5)
        .with_inference(InferenceTarget::http("/stream", "{}").expect("payload"));

    let mut out = Vec::new();
    let report = SmokeTest::new(common::runtime(), common::settings(port))
        .run_until(&config, &mut out, std::future::pending())
        .await
        .expect("check passes");

    let Some(InferenceReport::Http(reply)) = &report.inference else {
        panic!("expected HTTP inference report");
    };
    let ReplyBody::Stream(lines) = &reply.body else {
        panic!("expected streamed body, got {:?}", reply.body);
    };
    assert!(lines.iter().any(|l| l == "data: one"));
    assert!(lines.iter().any(|l| l == "data: two"));

    let printed = String::from_utf8(out).expect("utf8");
    assert!(printed.contains("Received a streaming response:"));
    assert!(printed.contains("data: two"));
}

#[tokio::test]
async fn test_error_status_is_reported_not_raised() {
    let (_state, port) = start(0).await;
    let config = CheckConfig::new("echo:http", 8000)
        .with_wait_seconds(5)
        .with_inference(InferenceTarget::http("/broken", "{}").expect("payload"));

    let mut out = Vec::new();
    let report = SmokeTest::new(common::runtime(), common::settings(port))
        .run_until(&config, &mut out, std::future::pending())
        .await
        .expect("transport succeeded");

    let Some(InferenceReport::Http(reply)) = &report.inference else {
        panic!("expected HTTP inference report");
    };
    assert_eq!(reply.status, 500);
    assert!(!reply.is_success());
    assert_eq!(reply.body, ReplyBody::Text("model not loaded".to_string()));
}

#[tokio::test]
async fn test_never_healthy_times_out_and_cleans_up() {
    let (state, port) = start(usize::MAX).await;
    let runtime = common::runtime();
    let config = CheckConfig::new("echo:http", 8000).with_wait_seconds(1);

    let started = Instant::now();
    let mut out = Vec::new();
    let err = SmokeTest::new(runtime.clone(), common::settings(port))
        .run_until(&config, &mut out, std::future::pending())
        .await
        .expect_err("never healthy");

    assert!(matches!(err, PreflightError::Health(_)));
    assert!(err.to_string().contains("did not become healthy in time"));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(state.health_calls.load(Ordering::SeqCst), 10);
    assert_eq!(runtime.container_count(), 0);
}

#[tokio::test]
async fn test_unknown_route_status_is_reported() {
    let (_state, port) = start(0).await;
    let runtime = common::runtime();
    let config = CheckConfig::new("echo:http", 8000)
        .with_wait_seconds(5)
        .with_inference(InferenceTarget::http("/missing-route", "{}").expect("payload"));

    let report = SmokeTest::new(runtime.clone(), common::settings(port))
        .run_until(&config, &mut Vec::new(), std::future::pending())
        .await
        .expect("404 is reported");
    let Some(InferenceReport::Http(reply)) = &report.inference else {
        panic!("expected HTTP inference report");
    };
    assert_eq!(reply.status, 404);
    assert_eq!(runtime.container_count(), 0);
}

#[tokio::test]
async fn test_connection_refused_is_an_error() {
    let (listener, port) = common::listener().await;
    drop(listener);

    let client = nvcf_preflight::HttpInferenceClient::new(
        format!("http://127.0.0.1:{port}"),
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
    .expect("client");
    let err = client
        .invoke(&mut Vec::new(), "/infer", &json!({}))
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, nvcf_preflight::HttpInferenceError::Send { .. }));
}

#[tokio::test]
async fn test_slow_reply_times_out_and_cleans_up() {
    let (_state, port) = start(0).await;
    let runtime = common::runtime();
    let config = CheckConfig::new("echo:http", 8000)
        .with_wait_seconds(5)
        .with_inference(InferenceTarget::http("/slow", "{}").expect("payload"));
    let settings = nvcf_preflight::PreflightSettings {
        http_read_timeout_secs: 1,
        ..common::settings(port)
    };

    let started = Instant::now();
    let err = SmokeTest::new(runtime.clone(), settings)
        .run_until(&config, &mut Vec::new(), std::future::pending())
        .await
        .expect_err("reply too slow");

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(
        err,
        PreflightError::HttpInference(nvcf_preflight::HttpInferenceError::Timeout { .. })
    ));
    assert!(err.to_string().contains("/slow"));
    assert_eq!(runtime.container_count(), 0);
}
