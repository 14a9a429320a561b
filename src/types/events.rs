//! Live-feed wire messages
//!
//! Every message a viewer receives is one [`FeedEvent`], tagged by `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{Decision, OrchestrationStep};
use super::telemetry::UnitStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// Periodic per-viewer tick.
    Telemetry(TelemetryPayload),
    /// Failure alert overlay.
    Alert(AlertEvent),
    /// One narrated orchestration step.
    McpStep(StepEvent),
    /// Final decision of a narrated orchestration.
    Solution(SolutionEvent),
    /// Halt cleared.
    SystemResumed(ResumeNotice),
}

impl FeedEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Telemetry(_) => "telemetry",
            Self::Alert(_) => "alert",
            Self::McpStep(_) => "mcp_step",
            Self::Solution(_) => "solution",
            Self::SystemResumed(_) => "system_resumed",
        }
    }
}

/// One telemetry tick as the dashboard renders it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryPayload {
    pub timestamp: DateTime<Utc>,
    pub unit_id: String,
    pub cycle: u64,
    pub rul: f64,
    pub vibration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_s11: Option<f64>,
    pub unit_status: UnitStatus,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub system_halted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub severity: String,
    #[serde(rename = "isError")]
    pub is_error: bool,
    pub unit_id: String,
    pub rul: f64,
    pub vibration: f64,
    pub cycle: Option<u64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepEvent {
    #[serde(flatten)]
    pub step: OrchestrationStep,
    pub unit_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolutionEvent {
    pub unit_id: String,
    pub decision: Box<Decision>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeNotice {
    pub downtime_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_wire_shape() {
        let event = FeedEvent::Telemetry(TelemetryPayload {
            timestamp: Utc::now(),
            unit_id: "ENGINE-001".to_string(),
            cycle: 42,
            rul: 0.0,
            vibration: 0.25,
            sensor_s11: Some(50.0),
            unit_status: UnitStatus::Critical,
            is_error: true,
            system_halted: true,
            downtime_seconds: Some(4.2),
        });
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "telemetry");
        assert_eq!(v["isError"], true);
        assert_eq!(v["unit_status"], "CRITICAL");
        assert_eq!(v["system_halted"], true);
        assert_eq!(v["downtime_seconds"], 4.2);
    }

    #[test]
    fn test_live_payload_omits_halt_fields() {
        let event = FeedEvent::Telemetry(TelemetryPayload {
            timestamp: Utc::now(),
            unit_id: "ENGINE-001".to_string(),
            cycle: 1,
            rul: 80.0,
            vibration: 0.1,
            sensor_s11: None,
            unit_status: UnitStatus::Healthy,
            is_error: false,
            system_halted: false,
            downtime_seconds: None,
        });
        let v = serde_json::to_value(&event).unwrap();
        assert!(v.get("system_halted").is_none());
        assert!(v.get("downtime_seconds").is_none());
        assert!(v.get("sensor_s11").is_none());
    }

    #[test]
    fn test_step_event_is_flat() {
        let event = FeedEvent::McpStep(StepEvent {
            step: OrchestrationStep::new(99, "System", "Orchestration error: boom"),
            unit_id: "ENGINE-001".to_string(),
            timestamp: Utc::now(),
        });
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "mcp_step");
        assert_eq!(v["step"], 99);
        assert_eq!(v["agent"], "System");
        assert_eq!(event.kind(), "mcp_step");
    }
}
