//! Chat Service - operator questions about the current decision
//!
//! ```text
//! message ─► contains "override"? ─► arm OverrideFlag, acknowledge
//!         └► ChatContext (halt snapshot > live tick > last decision)
//!              ├─► ConversationalResponder (bounded by deadline)
//!              └─► templated fallback on error or when unconfigured
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::pipeline::{elapsed_seconds, HaltState, TwinState};
use crate::sources::{with_deadline, ConversationalResponder};
use crate::types::{Decision, ShadowVerdict, UnitStatus};

pub mod templates;

pub use templates::{fallback_reply, NO_DATA_REPLY, OVERRIDE_ACK};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_unit_id")]
    pub unit_id: String,
}

fn default_unit_id() -> String {
    "ENGINE-001".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub override_active: bool,
    pub unit_id: String,
}

// ============================================================================
// Context
// ============================================================================

/// Flattened view of the current state handed to the responder.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatContext {
    pub unit_id: String,
    pub status: String,
    pub rul: Option<f64>,
    pub vibration: Option<f64>,
    pub cycle: Option<u64>,
    pub action_label: String,
    pub reason: String,
    pub technician_available: bool,
    pub shift_hours: f64,
    pub cost_saved: f64,
    pub system_halted: bool,
    pub downtime_seconds: f64,
    pub shadow: Option<ShadowVerdict>,
}

impl ChatContext {
    /// Overlay personnel, policy, shadow and cost from the last decision, or
    /// fill them with the given defaults.
    fn with_decision(mut self, decision: Option<&Decision>, default_label: &str, default_reason: &str) -> Self {
        match decision {
            Some(d) => {
                self.technician_available = d.personnel.available;
                self.shift_hours = d.personnel.hours_until_shift_end;
                self.action_label = d.final_action.as_str().to_string();
                self.reason = d.policy.reason.clone();
                self.cost_saved = d.cost_impact.cost_saved;
                self.shadow = Some(d.shadow.clone());
            }
            None => {
                self.technician_available = true;
                self.shift_hours = 4.0;
                self.action_label = default_label.to_string();
                self.reason = default_reason.to_string();
            }
        }
        self
    }

    fn blank(unit_id: String, status: String) -> Self {
        Self {
            unit_id,
            status,
            rul: None,
            vibration: None,
            cycle: None,
            action_label: String::new(),
            reason: String::new(),
            technician_available: true,
            shift_hours: 4.0,
            cost_saved: 0.0,
            system_halted: false,
            downtime_seconds: 0.0,
            shadow: None,
        }
    }

    fn from_decision(d: &Decision) -> Self {
        let mut ctx = Self::blank(d.unit_id.clone(), d.status.as_str().to_string());
        ctx.rul = Some(d.reading.remaining_life);
        ctx.vibration = Some(d.reading.vibration);
        ctx.cycle = Some(d.reading.cycle);
        ctx.downtime_seconds = d.downtime.elapsed_seconds;
        ctx.with_decision(Some(d), "", "")
    }

    /// One line, fields joined by `" | "`.
    pub fn flatten(&self) -> String {
        let dash = || "—".to_string();
        let mut lines = vec![
            format!("Unit: {}", self.unit_id),
            format!("Status: {}", self.status),
            format!("RUL: {} cycles", self.rul.map_or_else(dash, |v| v.to_string())),
            format!("Vibration: {} g RMS", self.vibration.map_or_else(dash, |v| v.to_string())),
            format!("Cycle: {}", self.cycle.map_or_else(dash, |v| v.to_string())),
            format!("DRL Decision: {} — {}", self.action_label, self.reason),
            format!(
                "Technician: {}, {}h left",
                if self.technician_available { "Available" } else { "Unavailable" },
                self.shift_hours
            ),
            format!("Cost saved: ${:.0}", self.cost_saved),
            format!("System halted: {}", self.system_halted),
            format!("Downtime: {:.0}s", self.downtime_seconds.trunc()),
        ];
        if let Some(shadow) = self.shadow.as_ref().filter(|s| s.conflict) {
            lines.push(format!(
                "Shadow Conflict: Rule={} vs DRL={}",
                shadow.rule_decision, shadow.policy_decision
            ));
        }
        lines.join(" | ")
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct ChatService {
    state: Arc<TwinState>,
    responder: Option<Arc<dyn ConversationalResponder>>,
    timeout: Duration,
}

impl ChatService {
    pub fn new(state: Arc<TwinState>, responder: Option<Arc<dyn ConversationalResponder>>, timeout: Duration) -> Self {
        Self {
            state,
            responder,
            timeout,
        }
    }

    pub async fn respond(&self, request: &ChatRequest) -> ChatReply {
        if request.message.to_lowercase().contains("override") {
            let newly_armed = self.state.override_flag.request();
            info!(unit_id = %request.unit_id, newly_armed, "[ChatService] Human override requested");
            return ChatReply {
                reply: OVERRIDE_ACK.to_string(),
                override_active: true,
                unit_id: request.unit_id.clone(),
            };
        }

        let override_active = self.state.override_flag.is_pending();
        let Some(ctx) = self.build_context().await else {
            return ChatReply {
                reply: NO_DATA_REPLY.to_string(),
                override_active,
                unit_id: request.unit_id.clone(),
            };
        };

        if let Some(responder) = &self.responder {
            match with_deadline(self.timeout, responder.reply(&ctx.flatten(), &request.message)).await {
                Ok(reply) => {
                    return ChatReply {
                        reply,
                        override_active,
                        unit_id: request.unit_id.clone(),
                    };
                }
                Err(e) => warn!(error = %e, "[ChatService] Responder failed, using local fallback"),
            }
        }

        ChatReply {
            reply: fallback_reply(&request.message, &ctx),
            override_active,
            unit_id: ctx.unit_id,
        }
    }

    /// Current context by priority: halt snapshot, then the latest live tick,
    /// then the last decision. `None` when none of them exist.
    pub async fn build_context(&self) -> Option<ChatContext> {
        let last_decision = self.state.last_decision.latest();

        match self.state.halt.current().await {
            HaltState::Halted { snapshot, halted_at } => {
                let mut ctx = ChatContext::blank(snapshot.unit_id.clone(), UnitStatus::Critical.as_str().to_string());
                ctx.rul = Some(snapshot.remaining_life);
                ctx.vibration = Some(snapshot.vibration);
                ctx.cycle = Some(snapshot.cycle);
                ctx.system_halted = true;
                ctx.downtime_seconds = elapsed_seconds(halted_at, Utc::now()).trunc();
                Some(ctx.with_decision(last_decision.as_deref(), "APPROVE_EXPRESS_SHIPPING", "Failure imminent — RUL=0."))
            }
            HaltState::Live { .. } => {
                if let Some(tick) = self.state.last_live_tick() {
                    let mut ctx = ChatContext::blank(tick.unit_id.clone(), tick.unit_status.as_str().to_string());
                    ctx.rul = Some(tick.rul);
                    ctx.vibration = Some(tick.vibration);
                    ctx.cycle = Some(tick.cycle);
                    Some(ctx.with_decision(last_decision.as_deref(), "MONITOR", "System nominal."))
                } else {
                    last_decision.as_deref().map(ChatContext::from_decision)
                }
            }
        }
    }
}
