//! Incident Coordinator - failure injection and resume flows
//!
//! ```text
//! inject_failure ─► SystemStateMachine HALTED (snapshot)
//!                ─► BroadcastHub alert
//!                ─► spawn Narrator (mcp_step × 10, solution)
//!
//! resume         ─► SystemStateMachine LIVE + grace window
//!                ─► BroadcastHub system_resumed
//! ```
//!
//! The halt is entered before the alert goes out, so a viewer reacting to the
//! alert already sees the frozen snapshot on its next tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::broadcast::BroadcastHub;
use super::state::{HaltStatus, StateError, TwinState};
use crate::agents::Narrator;
use crate::config::defaults;
use crate::sources::{with_deadline, TelemetrySource};
use crate::types::{rank_units, AlertEvent, FeedEvent, Reading, ResumeNotice, UnitSummary};

// ============================================================================
// Requests
// ============================================================================

/// A failure to inject. Every field is optional on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInjection {
    #[serde(default = "default_unit_id")]
    pub unit_id: String,
    #[serde(default)]
    pub rul: f64,
    #[serde(default)]
    pub vibration: f64,
    #[serde(default)]
    pub cycle: Option<u64>,
    /// Replaces the standard alert text when non-empty.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_unit_id() -> String {
    "ENGINE-001".to_string()
}

impl Default for FailureInjection {
    fn default() -> Self {
        Self {
            unit_id: default_unit_id(),
            rul: 0.0,
            vibration: 0.0,
            cycle: None,
            message: None,
        }
    }
}

impl FailureInjection {
    fn alert_message(&self) -> String {
        match self.message.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(message) => message.to_string(),
            None => format!(
                "⚠️ CRITICAL — {} failure triggered. RUL={} | Cycle: {} | Vibration: {} g",
                self.unit_id,
                self.rul,
                cycle_label(self.cycle),
                self.vibration
            ),
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> Reading {
        Reading {
            unit_id: self.unit_id.clone(),
            cycle: self.cycle.unwrap_or(0),
            remaining_life: self.rul,
            vibration: self.vibration,
            sensor_s11: Some(defaults::FAILURE_SNAPSHOT_S11),
            timestamp: now,
        }
    }
}

pub(crate) fn cycle_label(cycle: Option<u64>) -> String {
    cycle.map_or_else(|| "?".to_string(), |c| c.to_string())
}

/// Result of a successful injection.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionReceipt {
    pub alert: AlertEvent,
    /// Viewers the alert was delivered to.
    pub clients: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CoordinatorStats {
    pub failures_injected: u64,
    pub resumes: u64,
    pub orchestrations_spawned: u64,
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct IncidentCoordinator {
    state: Arc<TwinState>,
    hub: Arc<BroadcastHub>,
    narrator: Arc<Narrator>,
    telemetry: Arc<dyn TelemetrySource>,
    request_timeout: Duration,
    active_window_secs: i64,
    failures_injected: AtomicU64,
    resumes: AtomicU64,
    orchestrations_spawned: AtomicU64,
}

impl IncidentCoordinator {
    pub fn new(
        state: Arc<TwinState>,
        hub: Arc<BroadcastHub>,
        narrator: Arc<Narrator>,
        telemetry: Arc<dyn TelemetrySource>,
        request_timeout: Duration,
        active_window_secs: i64,
    ) -> Self {
        Self {
            state,
            hub,
            narrator,
            telemetry,
            request_timeout,
            active_window_secs,
            failures_injected: AtomicU64::new(0),
            resumes: AtomicU64::new(0),
            orchestrations_spawned: AtomicU64::new(0),
        }
    }

    /// Halt on the injected reading, alert every viewer, then run a narrated
    /// orchestration in the background.
    ///
    /// An invalid reading is rejected before any state change or broadcast.
    pub async fn inject_failure(&self, request: FailureInjection) -> Result<InjectionReceipt, StateError> {
        let now = Utc::now();
        self.state.halt.trigger_failure_at(request.snapshot(now), now).await?;
        self.failures_injected.fetch_add(1, Ordering::Relaxed);

        let alert = AlertEvent {
            severity: "critical".to_string(),
            is_error: true,
            unit_id: request.unit_id.clone(),
            rul: request.rul,
            vibration: request.vibration,
            cycle: request.cycle,
            message: request.alert_message(),
            timestamp: now,
        };
        let report = self.hub.broadcast(&FeedEvent::Alert(alert.clone())).await;
        info!(
            unit_id = %request.unit_id,
            rul = request.rul,
            clients = report.delivered,
            "[IncidentCoordinator] Failure injected, system halted"
        );

        self.spawn_orchestration(request.unit_id);

        Ok(InjectionReceipt {
            alert,
            clients: report.delivered,
        })
    }

    /// Leave the halt, announce it and return the downtime in seconds.
    pub async fn resume(&self) -> f64 {
        let downtime_seconds = self.state.halt.resume().await;
        self.resumes.fetch_add(1, Ordering::Relaxed);

        let notice = FeedEvent::SystemResumed(ResumeNotice {
            downtime_seconds,
            timestamp: Utc::now(),
        });
        let report = self.hub.broadcast(&notice).await;
        info!(downtime_seconds, clients = report.delivered, "[IncidentCoordinator] System resumed");
        downtime_seconds
    }

    pub async fn status(&self) -> HaltStatus {
        self.state.halt.status_at(Utc::now()).await
    }

    /// Ranked unit picker. Degrades to an empty list when the store fails.
    pub async fn list_units(&self) -> Vec<UnitSummary> {
        match with_deadline(self.request_timeout, self.telemetry.list_units()).await {
            Ok(activity) => rank_units(activity, Utc::now(), self.active_window_secs),
            Err(e) => {
                warn!(error = %e, source = self.telemetry.source_name(), "[IncidentCoordinator] Unit listing failed, returning empty list");
                Vec::new()
            }
        }
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            failures_injected: self.failures_injected.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
            orchestrations_spawned: self.orchestrations_spawned.load(Ordering::Relaxed),
        }
    }

    fn spawn_orchestration(&self, unit_id: String) {
        self.orchestrations_spawned.fetch_add(1, Ordering::Relaxed);
        let narrator = Arc::clone(&self.narrator);
        tokio::spawn(async move {
            if let Err(e) = narrator.run(&unit_id).await {
                debug!(unit_id = %unit_id, error = %e, "[IncidentCoordinator] Narrated orchestration ended with error");
            }
        });
    }
}
