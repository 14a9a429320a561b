//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the JSON endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port, no Elasticsearch.

use gantry_twin::api::{create_app, DashboardState};
use gantry_twin::config::TwinConfig;
use gantry_twin::pipeline::{Collaborators, TwinRuntime, OFFLINE_UNITS};
use gantry_twin::sources::MemoryTelemetrySource;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_runtime() -> Arc<TwinRuntime> {
    let mut config = TwinConfig::default();
    config.narration.pacing_enabled = false;
    let collaborators = Collaborators::offline(&config);
    Arc::new(TwinRuntime::new(config, collaborators))
}

fn create_test_state() -> DashboardState {
    DashboardState::new(create_test_runtime())
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// All GET endpoints should return 200 against the offline runtime.
#[tokio::test]
async fn test_get_endpoints_return_200() {
    let endpoints = ["/", "/api/status", "/units", "/orchestrate/ENGINE-001"];

    for endpoint in &endpoints {
        let app = create_app(create_test_state());
        let resp = app.oneshot(get(endpoint)).await.unwrap();

        assert!(
            resp.status().is_success(),
            "GET {endpoint} returned status {}",
            resp.status()
        );
    }
}

/// Every success body carries the `{data, meta}` envelope.
#[tokio::test]
async fn test_root_returns_envelope() {
    let app = create_app(create_test_state());
    let resp = app.oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["data"]["service"], "gantry-twin");
    assert_eq!(json["data"]["status"], "online");
    assert_eq!(json["data"]["policy"], "reward-argmax");
    assert_eq!(json["meta"]["service"], "gantry-twin");
    assert!(json["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_status_starts_live() {
    let app = create_app(create_test_state());
    let json = body_json(app.oneshot(get("/api/status")).await.unwrap()).await;

    assert_eq!(json["data"]["halted"], false);
    assert_eq!(json["data"]["downtime_seconds"], 0.0);
    assert_eq!(json["data"]["override_pending"], false);
    assert_eq!(json["data"]["viewers"], 0);
    assert!(json["data"]["last_decision_at"].is_null());
}

#[tokio::test]
async fn test_units_lists_offline_fleet() {
    let app = create_app(create_test_state());
    let json = body_json(app.oneshot(get("/units")).await.unwrap()).await;

    assert_eq!(json["data"]["count"], 3);
    let units = json["data"]["units"].as_array().unwrap();
    assert_eq!(units.len(), 3);
}

#[tokio::test]
async fn test_orchestrate_returns_decision() {
    let app = create_app(create_test_state());
    let resp = app.oneshot(get("/orchestrate/ENGINE-002")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    let decision = &json["data"];
    assert_eq!(decision["unit_id"], "ENGINE-002");
    assert_eq!(decision["status"], "HEALTHY");
    assert!(decision["steps"].as_array().is_some_and(|s| !s.is_empty()));
    assert!(decision["final_action"].is_string());

    let expected_code = if decision["policy"]["action"] == "APPROVE" { 1 } else { 0 };
    assert_eq!(decision["policy"]["action_code"], expected_code);
}

/// Unknown unit: the store has no reading for it.
#[tokio::test]
async fn test_orchestrate_unknown_unit_returns_404() {
    let app = create_app(create_test_state());
    let resp = app.oneshot(get("/orchestrate/ENGINE-404")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert!(json["error"]["message"].as_str().is_some_and(|m| m.contains("ENGINE-404")));
}

/// Store down: orchestration is unavailable, not missing.
#[tokio::test]
async fn test_orchestrate_with_store_down_returns_503() {
    let config = TwinConfig::default();
    let telemetry = Arc::new(MemoryTelemetrySource::with_healthy_units(OFFLINE_UNITS));
    telemetry.set_unavailable(true);
    let collaborators = Collaborators {
        telemetry,
        ..Collaborators::offline(&config)
    };
    let app = create_app(DashboardState::new(Arc::new(TwinRuntime::new(config, collaborators))));

    let resp = app.oneshot(get("/orchestrate/ENGINE-001")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(resp).await;
    assert!(json["error"]["message"].as_str().is_some_and(|m| m.contains("Orchestration failed")));
}

#[tokio::test]
async fn test_broadcast_alert_halts_and_resume_clears() {
    let runtime = create_test_runtime();

    let app = create_app(DashboardState::new(Arc::clone(&runtime)));
    let resp = app
        .oneshot(post_json(
            "/api/broadcast-alert",
            r#"{"unit_id":"ENGINE-001","rul":0,"vibration":0.25,"cycle":999}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["data"]["status"], "alert_broadcast");
    assert_eq!(json["data"]["clients"], 0);
    assert_eq!(json["data"]["payload"]["unit_id"], "ENGINE-001");

    let app = create_app(DashboardState::new(Arc::clone(&runtime)));
    let json = body_json(app.oneshot(get("/api/status")).await.unwrap()).await;
    assert_eq!(json["data"]["halted"], true);
    assert_eq!(json["data"]["unit_id"], "ENGINE-001");

    let app = create_app(DashboardState::new(Arc::clone(&runtime)));
    let resp = app.oneshot(post_json("/system-resume", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["data"]["status"], "resumed");
    assert!(json["data"]["downtime_seconds"].as_f64().is_some_and(|d| d >= 0.0));

    let app = create_app(DashboardState::new(runtime));
    let json = body_json(app.oneshot(get("/api/status")).await.unwrap()).await;
    assert_eq!(json["data"]["halted"], false);
    assert_eq!(json["data"]["grace_active"], true);
    assert_eq!(json["data"]["stats"]["failures_injected"], 1);
    assert_eq!(json["data"]["stats"]["resumes"], 1);
}

#[tokio::test]
async fn test_broadcast_alert_rejects_negative_reading() {
    let runtime = create_test_runtime();
    let app = create_app(DashboardState::new(Arc::clone(&runtime)));
    let resp = app
        .oneshot(post_json("/api/broadcast-alert", r#"{"unit_id":"ENGINE-001","rul":-1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!runtime.state.halt.is_halted().await);
}

#[tokio::test]
async fn test_broadcast_alert_rejects_malformed_json() {
    let app = create_app(create_test_state());
    let resp = app
        .oneshot(post_json("/api/broadcast-alert", "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_chat_override_arms_flag() {
    let runtime = create_test_runtime();
    let app = create_app(DashboardState::new(Arc::clone(&runtime)));
    let resp = app
        .oneshot(post_json("/chat", r#"{"message":"Override the policy and ship it"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["data"]["override_active"], true);
    assert_eq!(json["data"]["unit_id"], "ENGINE-001");
    assert!(runtime.state.override_flag.is_pending());
}

#[tokio::test]
async fn test_chat_without_context_returns_no_data_reply() {
    let app = create_app(create_test_state());
    let resp = app
        .oneshot(post_json("/chat", r#"{"message":"what is the status?"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["data"]["override_active"], false);
    assert!(json["data"]["reply"].as_str().is_some_and(|r| !r.is_empty()));
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = create_app(create_test_state());
    let resp = app
        .oneshot(post_json("/chat", r#"{"message":"   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = create_app(create_test_state());
    let resp = app.oneshot(get("/api/v1/nonexistent")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
