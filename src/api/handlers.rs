//! API route handlers
//!
//! - `GET /` service banner
//! - `GET /api/status` halt state, override, viewers, last decision
//! - `GET /units` ranked unit picker
//! - `GET /orchestrate/:unit_id` one silent decision cycle
//! - `POST /api/broadcast-alert` failure injection
//! - `POST /system-resume` leave the halt
//! - `POST /chat` operator question / override

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse, SERVICE_NAME};
use crate::agents::OrchestrationError;
use crate::chat::ChatRequest;
use crate::pipeline::{CoordinatorStats, FailureInjection, HaltStatus, TwinRuntime};
use crate::types::{AlertEvent, UnitSummary};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct DashboardState {
    pub runtime: Arc<TwinRuntime>,
}

impl DashboardState {
    pub fn new(runtime: Arc<TwinRuntime>) -> Self {
        Self { runtime }
    }
}

// ============================================================================
// Response Bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ServiceBanner {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub telemetry_source: String,
    pub policy: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub halt: HaltStatus,
    pub override_pending: bool,
    pub viewers: usize,
    pub last_decision_at: Option<DateTime<Utc>>,
    pub last_decision_unit: Option<String>,
    pub stats: CoordinatorStats,
}

#[derive(Debug, Serialize)]
pub struct UnitsResponse {
    pub units: Vec<UnitSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub status: &'static str,
    pub clients: usize,
    pub payload: AlertEvent,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub status: &'static str,
    pub downtime_seconds: f64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn root(State(state): State<DashboardState>) -> Response {
    let rt = &state.runtime;
    ApiResponse::ok(ServiceBanner {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        status: "online",
        telemetry_source: rt.telemetry_source_name().to_string(),
        policy: rt.engine.policy_name().to_string(),
        uptime_secs: rt.uptime_secs(),
    })
}

/// GET /api/status
pub async fn get_status(State(state): State<DashboardState>) -> Response {
    let rt = &state.runtime;
    let last = rt.state.last_decision.latest();
    ApiResponse::ok(StatusResponse {
        halt: rt.coordinator.status().await,
        override_pending: rt.state.override_flag.is_pending(),
        viewers: rt.hub.subscriber_count().await,
        last_decision_at: last.as_ref().map(|d| d.timestamp),
        last_decision_unit: last.as_ref().map(|d| d.unit_id.clone()),
        stats: rt.coordinator.stats(),
    })
}

/// GET /units
pub async fn list_units(State(state): State<DashboardState>) -> Response {
    let units = state.runtime.coordinator.list_units().await;
    ApiResponse::ok(UnitsResponse {
        count: units.len(),
        units,
    })
}

/// GET /orchestrate/:unit_id
pub async fn orchestrate(State(state): State<DashboardState>, Path(unit_id): Path<String>) -> Response {
    match state.runtime.engine.orchestrate(&unit_id).await {
        Ok(decision) => ApiResponse::ok(decision.as_ref()),
        Err(e) => {
            warn!(unit_id = %unit_id, error = %e, "[HttpServer] Orchestration failed");
            orchestration_error(&e)
        }
    }
}

fn orchestration_error(e: &OrchestrationError) -> Response {
    match e {
        OrchestrationError::NoTelemetry(_) => ApiErrorResponse::not_found(e.to_string()),
        _ => ApiErrorResponse::service_unavailable(format!("Orchestration failed: {e}")),
    }
}

/// POST /api/broadcast-alert
pub async fn broadcast_alert(
    State(state): State<DashboardState>,
    body: Result<Json<FailureInjection>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    match state.runtime.coordinator.inject_failure(request).await {
        Ok(receipt) => ApiResponse::ok(AlertResponse {
            status: "alert_broadcast",
            clients: receipt.clients,
            payload: receipt.alert,
        }),
        Err(e) => {
            warn!(error = %e, "[HttpServer] Failure injection rejected");
            ApiErrorResponse::unprocessable(e.to_string())
        }
    }
}

/// POST /system-resume
pub async fn system_resume(State(state): State<DashboardState>) -> Response {
    let downtime_seconds = state.runtime.coordinator.resume().await;
    ApiResponse::ok(ResumeResponse {
        status: "resumed",
        downtime_seconds,
    })
}

/// POST /chat
pub async fn chat(State(state): State<DashboardState>, body: Result<Json<ChatRequest>, JsonRejection>) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };
    if request.message.trim().is_empty() {
        return ApiErrorResponse::bad_request("message must not be empty");
    }

    let reply = state.runtime.chat.respond(&request).await;
    info!(unit_id = %reply.unit_id, override_active = reply.override_active, "[HttpServer] Chat answered");
    ApiResponse::ok(reply)
}
