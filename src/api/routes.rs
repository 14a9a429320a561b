//! API route definitions
//!
//! Paths match what the dashboard and the failure-trigger tooling call:
//! `/system-resume`, `/units`, `/orchestrate/*` and `/chat` carry no `/api`
//! prefix because the dashboard's dev proxy strips it.

use axum::{routing::{get, post}, Router};

use super::handlers::{self, DashboardState};
use super::ws;

/// JSON endpoints
pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/status", get(handlers::get_status))
        .route("/units", get(handlers::list_units))
        .route("/orchestrate/:unit_id", get(handlers::orchestrate))
        .route("/api/broadcast-alert", post(handlers::broadcast_alert))
        .route("/system-resume", post(handlers::system_resume))
        .route("/chat", post(handlers::chat))
        .with_state(state)
}

/// Live-feed WebSocket upgrade (kept out of response compression)
pub fn feed_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/ws/telemetry/:unit_id", get(ws::telemetry_ws))
        .with_state(state)
}
