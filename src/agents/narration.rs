//! Narrated orchestration
//!
//! Drives the same phases as [`OrchestrationEngine::orchestrate`] but
//! broadcasts a fixed, ordered sequence of `mcp_step` events with a pacing
//! pause after each, then a `solution` event carrying the Decision. Pacing is
//! presentation only: disabling it changes neither the order nor the text.
//!
//! The narrated cycle finalizes through the same path as the silent one, so a
//! pending human override is consumed here too and flips this Decision.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::orchestrator::{conflict_summary, OrchestrationEngine, OrchestrationError};
use crate::pipeline::BroadcastHub;
use crate::types::{
    Decision, FeedEvent, OrchestrationStep, PersonnelStatus, PolicyAction, Reading, SolutionEvent, StepEvent,
};

/// Step index used for the error notice broadcast when a cycle aborts.
pub const ERROR_STEP: u32 = 99;

/// One narrated step: what to show and how long to hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDescriptor {
    pub step: OrchestrationStep,
    pub pause: Duration,
}

impl StepDescriptor {
    fn new(step: u32, agent: &str, event: String, pause_secs: f64) -> Self {
        Self {
            step: OrchestrationStep::new(step, agent, event),
            pause: Duration::from_secs_f64(pause_secs),
        }
    }
}

// ============================================================================
// Step Script
// ============================================================================

pub fn alert_step(unit_id: &str) -> StepDescriptor {
    StepDescriptor::new(
        1,
        "ES|QL",
        format!("Alert triggered for unit {unit_id} — querying Elasticsearch for latest telemetry…"),
        3.0,
    )
}

pub fn telemetry_steps(reading: &Reading) -> [StepDescriptor; 2] {
    [
        StepDescriptor::new(
            2,
            "Watchman",
            "Scanning 20,000+ NASA C-MAPSS records via MCP → platform_core_execute_esql…".to_string(),
            2.5,
        ),
        StepDescriptor::new(
            3,
            "Watchman",
            format!(
                "Telemetry confirmed — RUL={:.1} cycles remaining, Vibration={:.4} g RMS. Engine degradation detected.",
                reading.remaining_life, reading.vibration
            ),
            3.0,
        ),
    ]
}

pub fn personnel_steps(personnel: &PersonnelStatus) -> [StepDescriptor; 2] {
    [
        StepDescriptor::new(
            4,
            "Foreman",
            "Querying gantry_personnel index — locating nearest available technician…".to_string(),
            2.5,
        ),
        StepDescriptor::new(
            5,
            "Foreman",
            format!(
                "Technician {} — {}, {:.1}h remaining. {}.",
                personnel.technician_name,
                if personnel.available { "ON SHIFT, available" } else { "OFF SHIFT" },
                personnel.hours_until_shift_end,
                personnel.location.as_deref().unwrap_or("Location unknown")
            ),
            3.0,
        ),
    ]
}

pub fn policy_steps(reading: &Reading, personnel: &PersonnelStatus, part_cost: f64, raw: PolicyAction) -> [StepDescriptor; 2] {
    [
        StepDescriptor::new(
            6,
            "DRL Policy",
            format!(
                "Loading PPO neural network (50,000+ training episodes)… evaluating state vector [RUL={:.1}, Vib={:.4}, Shift={:.1}h, Cost=${:.0}]",
                reading.remaining_life, reading.vibration, personnel.hours_until_shift_end, part_cost
            ),
            3.5,
        ),
        StepDescriptor::new(
            7,
            "DRL Policy",
            format!(
                "Decision: {} express shipping — {}",
                raw.label(),
                if raw.is_approve() {
                    "failure imminent, part needed urgently"
                } else {
                    "cost risk too high for current shift window"
                }
            ),
            2.5,
        ),
    ]
}

pub fn shadow_steps(decision_shadow: &crate::types::ShadowVerdict) -> [StepDescriptor; 2] {
    let verdict = if decision_shadow.conflict {
        StepDescriptor::new(
            9,
            "Shadow Model",
            format!("⚠️ {}", conflict_summary(decision_shadow).replacen("CONFLICT", "CONFLICT DETECTED", 1)),
            3.0,
        )
    } else {
        StepDescriptor::new(
            9,
            "Shadow Model",
            format!(
                "Models aligned — both recommend {}. High-confidence decision.",
                decision_shadow.policy_decision
            ),
            2.5,
        )
    };
    [
        StepDescriptor::new(8, "Shadow Model", "Comparing rule-based logic vs neural network decision…".to_string(), 2.5),
        verdict,
    ]
}

pub fn compile_step() -> StepDescriptor {
    StepDescriptor::new(
        10,
        "Gantry AI",
        "All agents in agreement. Compiling maintenance order…".to_string(),
        3.5,
    )
}

// ============================================================================
// Narrator
// ============================================================================

pub struct Narrator {
    engine: Arc<OrchestrationEngine>,
    hub: Arc<BroadcastHub>,
    pacing_enabled: bool,
}

impl Narrator {
    pub fn new(engine: Arc<OrchestrationEngine>, hub: Arc<BroadcastHub>, pacing_enabled: bool) -> Self {
        Self {
            engine,
            hub,
            pacing_enabled,
        }
    }

    /// Run a narrated cycle. On failure a step-99 `System` event is broadcast
    /// and the error returned; nothing is stored.
    pub async fn run(&self, unit_id: &str) -> Result<Arc<Decision>, OrchestrationError> {
        match self.narrate(unit_id).await {
            Ok(decision) => {
                let solution = FeedEvent::Solution(SolutionEvent {
                    unit_id: unit_id.to_string(),
                    decision: Box::new(decision.as_ref().clone()),
                    timestamp: Utc::now(),
                });
                let report = self.hub.broadcast(&solution).await;
                info!(unit_id, action = %decision.final_action, viewers = report.delivered, "[Narrator] Solution broadcast");
                Ok(decision)
            }
            Err(e) => {
                warn!(unit_id, error = %e, "[Narrator] Orchestration aborted");
                self.emit(
                    unit_id,
                    &StepDescriptor {
                        step: OrchestrationStep::new(ERROR_STEP, "System", format!("Orchestration error: {e}")),
                        pause: Duration::ZERO,
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn narrate(&self, unit_id: &str) -> Result<Arc<Decision>, OrchestrationError> {
        let engine = &self.engine;

        self.emit(unit_id, &alert_step(unit_id)).await;
        let reading = engine.fetch_reading(unit_id).await?;
        let personnel = engine.fetch_personnel().await?;

        for step in telemetry_steps(&reading) {
            self.emit(unit_id, &step).await;
        }
        for step in personnel_steps(&personnel) {
            self.emit(unit_id, &step).await;
        }

        let evaluation = engine.evaluate(&reading, &personnel)?;
        for step in policy_steps(&reading, &personnel, engine.settings().part_cost, evaluation.raw_action) {
            self.emit(unit_id, &step).await;
        }
        for step in shadow_steps(&evaluation.shadow) {
            self.emit(unit_id, &step).await;
        }

        let decision = engine.finalize(unit_id, reading, personnel, evaluation).await;
        self.emit(unit_id, &compile_step()).await;
        Ok(decision)
    }

    async fn emit(&self, unit_id: &str, descriptor: &StepDescriptor) {
        let event = FeedEvent::McpStep(StepEvent {
            step: descriptor.step.clone(),
            unit_id: unit_id.to_string(),
            timestamp: Utc::now(),
        });
        self.hub.broadcast(&event).await;
        if self.pacing_enabled && !descriptor.pause.is_zero() {
            tokio::time::sleep(descriptor.pause).await;
        }
    }
}
