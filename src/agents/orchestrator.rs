//! Orchestration Engine - one end-to-end decision cycle per request
//!
//! ```text
//! Reading (halt snapshot or store) ──┐
//! PersonnelStatus (on-duty tech) ────┼─► StateVector ─► DecisionPolicy ─► raw action
//!                                    │                                      │
//!                                    │                 ShadowEvaluator ◄────┤
//!                                    │                                      ▼
//!                                    └──────────────► OverrideFlag (one-shot flip)
//!                                                                           │
//!                                                             Decision ◄────┘
//! ```
//!
//! The phases are public so the narrated variant can interleave step events
//! between them without duplicating any decision logic.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::shadow::ShadowEvaluator;
use crate::config::{defaults, TwinConfig};
use crate::pipeline::TwinState;
use crate::sources::{with_deadline, DecisionPolicy, PersonnelSource, PolicyError, SourceError, TelemetrySource};
use crate::types::{
    CostComparison, CostImpact, Decision, DowntimeInfo, OrchestrationStep, PersonnelStatus, PolicyAction,
    PolicyOutcome, Reading, ShadowVerdict, StateVector, UnitStatus,
};

// ============================================================================
// Errors
// ============================================================================

/// A cycle aborted before a Decision was produced. Nothing was stored.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Telemetry unavailable for {unit_id}: {source}")]
    Telemetry {
        unit_id: String,
        #[source]
        source: SourceError,
    },
    #[error("No telemetry found for {0}")]
    NoTelemetry(String),
    #[error("Personnel lookup failed for {technician}: {source}")]
    Personnel {
        technician: String,
        #[source]
        source: SourceError,
    },
    #[error("Policy evaluation failed: {0}")]
    Policy(#[from] PolicyError),
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub technician: String,
    pub part_cost: f64,
    pub request_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &TwinConfig) -> Self {
        Self {
            technician: config.personnel.technician.clone(),
            part_cost: config.policy.part_cost,
            request_timeout: config.elastic.request_timeout(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&TwinConfig::default())
    }
}

/// Policy and shadow output for one cycle, before any override.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub state_vector: StateVector,
    pub raw_action: PolicyAction,
    pub shadow: ShadowVerdict,
}

pub struct OrchestrationEngine {
    state: Arc<TwinState>,
    telemetry: Arc<dyn TelemetrySource>,
    personnel: Arc<dyn PersonnelSource>,
    policy: Arc<dyn DecisionPolicy>,
    shadow: ShadowEvaluator,
    settings: EngineSettings,
}

impl OrchestrationEngine {
    pub fn new(
        state: Arc<TwinState>,
        telemetry: Arc<dyn TelemetrySource>,
        personnel: Arc<dyn PersonnelSource>,
        policy: Arc<dyn DecisionPolicy>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            state,
            telemetry,
            personnel,
            policy,
            shadow: ShadowEvaluator::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn policy_name(&self) -> &str {
        self.policy.policy_name()
    }

    /// Run one silent cycle and store the result as the most recent decision.
    pub async fn orchestrate(&self, unit_id: &str) -> Result<Arc<Decision>, OrchestrationError> {
        let reading = self.fetch_reading(unit_id).await?;
        let personnel = self.fetch_personnel().await?;
        let evaluation = self.evaluate(&reading, &personnel)?;
        Ok(self.finalize(unit_id, reading, personnel, evaluation).await)
    }

    /// Halt snapshot for the same unit if halted, otherwise the store's latest.
    ///
    /// The snapshot wins because the store is eventually consistent and may
    /// still return the pre-failure document.
    pub async fn fetch_reading(&self, unit_id: &str) -> Result<Reading, OrchestrationError> {
        if let Some(snapshot) = self.state.halt.halted_snapshot_for(unit_id).await {
            return Ok(snapshot);
        }

        match with_deadline(self.settings.request_timeout, self.telemetry.latest(unit_id)).await {
            Ok(Some(reading)) => Ok(reading),
            Ok(None) => Err(OrchestrationError::NoTelemetry(unit_id.to_string())),
            Err(source) => {
                warn!(unit_id, error = %source, "[Orchestrator] Telemetry fetch failed");
                Err(OrchestrationError::Telemetry {
                    unit_id: unit_id.to_string(),
                    source,
                })
            }
        }
    }

    pub async fn fetch_personnel(&self) -> Result<PersonnelStatus, OrchestrationError> {
        let technician = &self.settings.technician;
        with_deadline(self.settings.request_timeout, self.personnel.lookup(technician))
            .await
            .map_err(|source| {
                warn!(technician = %technician, error = %source, "[Orchestrator] Personnel lookup failed");
                OrchestrationError::Personnel {
                    technician: technician.clone(),
                    source,
                }
            })
    }

    /// Build the state vector, run the policy and the shadow rule.
    pub fn evaluate(&self, reading: &Reading, personnel: &PersonnelStatus) -> Result<Evaluation, OrchestrationError> {
        let state_vector = StateVector::from_inputs(reading, personnel, self.settings.part_cost);
        let raw_action = self.policy.evaluate(&state_vector)?;
        let shadow = self
            .shadow
            .evaluate(reading, personnel, raw_action, self.settings.part_cost);
        Ok(Evaluation {
            state_vector,
            raw_action,
            shadow,
        })
    }

    /// Consume any pending override, assemble the Decision and store it.
    pub async fn finalize(
        &self,
        unit_id: &str,
        reading: Reading,
        personnel: PersonnelStatus,
        evaluation: Evaluation,
    ) -> Arc<Decision> {
        let now = Utc::now();
        let overridden = self.state.override_flag.consume();
        let action = if overridden {
            evaluation.raw_action.flipped()
        } else {
            evaluation.raw_action
        };
        let final_action = action.final_action();
        let part_cost = self.settings.part_cost;

        let reason = decision_reason(
            action,
            reading.remaining_life,
            personnel.hours_until_shift_end,
            overridden,
        );
        let steps = build_step_log(unit_id, &reading, &personnel, action, &evaluation.shadow, overridden);

        let halt = self.state.halt.status_at(now).await;

        let decision = Decision {
            timestamp: now,
            unit_id: unit_id.to_string(),
            status: UnitStatus::for_decision(reading.remaining_life),
            reading,
            personnel,
            state_vector: evaluation.state_vector,
            policy: PolicyOutcome {
                raw_action: evaluation.raw_action,
                action,
                action_code: action.code(),
                label: final_action,
                reason,
                overridden,
            },
            shadow: evaluation.shadow,
            overridden,
            cost_impact: CostImpact {
                part_cost,
                cost_saved: if action.is_approve() { 0.0 } else { part_cost },
            },
            cost_comparison: CostComparison::standard(),
            downtime: DowntimeInfo {
                failure_timestamp: halt.failure_timestamp,
                elapsed_seconds: halt.downtime_seconds,
            },
            data_volume: defaults::DATA_VOLUME_NOTE.to_string(),
            steps,
            final_action,
        };

        info!(
            unit_id,
            status = %decision.status,
            action = %final_action,
            overridden,
            conflict = decision.shadow.conflict,
            "[Orchestrator] Decision ready"
        );
        self.state.last_decision.store(decision)
    }
}

// ============================================================================
// Wording
// ============================================================================

/// Labor-mismatch risk quoted on a veto: `trunc(min(99, 80 + (10 - rul) * 2))`.
#[allow(clippy::cast_possible_truncation)]
pub fn labor_mismatch_risk(remaining_life: f64) -> i64 {
    (80.0 + (10.0 - remaining_life) * 2.0).min(99.0) as i64
}

/// Human-readable justification. Thresholds drive the wording, not the decision.
pub fn decision_reason(action: PolicyAction, remaining_life: f64, shift_hours: f64, overridden: bool) -> String {
    let reason = match action {
        PolicyAction::Approve => format!(
            "DRL approved: RUL={remaining_life:.1} is critically low and technician has {shift_hours:.1}h remaining on shift."
        ),
        PolicyAction::Veto => format!(
            "Vetoed because DRL calculated a {}% risk of labor mismatch – technician shift ends in {shift_hours:.1}h, insufficient for express install.",
            labor_mismatch_risk(remaining_life)
        ),
    };
    if overridden {
        format!("[HUMAN OVERRIDE] {reason}")
    } else {
        reason
    }
}

/// Ordered audit log stored on the Decision.
pub fn build_step_log(
    unit_id: &str,
    reading: &Reading,
    personnel: &PersonnelStatus,
    action: PolicyAction,
    shadow: &ShadowVerdict,
    overridden: bool,
) -> Vec<OrchestrationStep> {
    let mut steps = vec![
        OrchestrationStep::new(1, "ES|QL", format!("Alert triggered for unit {unit_id}")),
        OrchestrationStep::new(
            2,
            "Watchman",
            format!(
                "Telemetry verified – RUL={:.1}, Vibration={:.4}",
                reading.remaining_life, reading.vibration
            ),
        ),
        OrchestrationStep::new(
            3,
            "Foreman",
            format!(
                "Shift check – {}, {:.1}h remaining",
                if personnel.available { "Available" } else { "Unavailable" },
                personnel.hours_until_shift_end
            ),
        ),
        OrchestrationStep::new(
            4,
            "DRL Policy",
            format!("Cost-validated decision: {} express shipping", action.label()),
        ),
    ];

    if shadow.conflict {
        steps.push(OrchestrationStep::new(5, "Shadow Model", conflict_summary(shadow)));
    }
    if overridden {
        let next = u32::try_from(steps.len() + 1).unwrap_or(u32::MAX);
        steps.push(OrchestrationStep::new(
            next,
            "Human Override",
            "Operator manually overrode DRL decision — Human-in-the-loop active",
        ));
    }
    steps
}

pub(crate) fn conflict_summary(shadow: &ShadowVerdict) -> String {
    format!(
        "CONFLICT — Standard Rule: {} vs DRL: {}. Enterprise Verdict: {}. ${:.0} saved.",
        shadow.rule_decision, shadow.policy_decision, shadow.verdict, shadow.estimated_cost_saved
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FixedPolicy, MemoryPersonnelSource, MemoryTelemetrySource};

    fn reading(rul: f64) -> Reading {
        Reading {
            unit_id: "ENGINE-001".to_string(),
            cycle: 150,
            remaining_life: rul,
            vibration: 0.08,
            sensor_s11: Some(16.0),
            timestamp: Utc::now(),
        }
    }

    async fn engine_with(rul: f64, policy_code: u8) -> (OrchestrationEngine, Arc<TwinState>, Arc<MemoryTelemetrySource>) {
        let state = Arc::new(TwinState::new(Duration::from_secs(30)));
        let telemetry = Arc::new(MemoryTelemetrySource::new());
        telemetry.push(reading(rul)).await;
        let personnel = Arc::new(MemoryPersonnelSource::with_technician("Soufiane", 4.0));
        let engine = OrchestrationEngine::new(
            Arc::clone(&state),
            telemetry.clone(),
            personnel,
            Arc::new(FixedPolicy(policy_code)),
            EngineSettings::default(),
        );
        (engine, state, telemetry)
    }

    #[test]
    fn test_risk_formula() {
        assert_eq!(labor_mismatch_risk(5.0), 90);
        assert_eq!(labor_mismatch_risk(0.0), 99);
        assert_eq!(labor_mismatch_risk(9.3), 81);
        assert_eq!(labor_mismatch_risk(20.0), 60);
    }

    #[test]
    fn test_reason_wording() {
        assert_eq!(
            decision_reason(PolicyAction::Approve, 2.0, 4.0, false),
            "DRL approved: RUL=2.0 is critically low and technician has 4.0h remaining on shift."
        );
        assert_eq!(
            decision_reason(PolicyAction::Veto, 5.0, 4.0, true),
            "[HUMAN OVERRIDE] Vetoed because DRL calculated a 90% risk of labor mismatch – technician shift ends in 4.0h, insufficient for express install."
        );
    }

    #[tokio::test]
    async fn test_veto_cycle_with_conflict() {
        let (engine, state, _) = engine_with(5.0, 0).await;
        let d = engine.orchestrate("ENGINE-001").await.unwrap();

        assert_eq!(d.status, UnitStatus::Warning);
        assert_eq!(d.final_action.as_str(), "VETO_EXPRESS_SHIPPING");
        assert_eq!(d.cost_impact.cost_saved, 350.0);
        assert!(d.shadow.conflict);
        assert!(!d.overridden);
        assert_eq!(d.state_vector.as_array(), [5.0, 0.08, 4.0, 350.0]);

        let agents: Vec<&str> = d.steps.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["ES|QL", "Watchman", "Foreman", "DRL Policy", "Shadow Model"]);
        assert!(state.last_decision.latest().is_some());
    }

    #[tokio::test]
    async fn test_override_flips_once() {
        let (engine, state, _) = engine_with(5.0, 0).await;
        state.override_flag.request();

        let first = engine.orchestrate("ENGINE-001").await.unwrap();
        assert!(first.overridden);
        assert_eq!(first.policy.raw_action, PolicyAction::Veto);
        assert_eq!(first.policy.action, PolicyAction::Approve);
        assert_eq!(first.cost_impact.cost_saved, 0.0);
        assert!(first.policy.reason.starts_with("[HUMAN OVERRIDE] DRL approved"));
        assert_eq!(first.steps.last().map(|s| s.agent.as_str()), Some("Human Override"));
        assert_eq!(first.steps.last().map(|s| s.step), Some(6));

        let second = engine.orchestrate("ENGINE-001").await.unwrap();
        assert!(!second.overridden);
        assert_eq!(second.policy.action, PolicyAction::Veto);
    }

    #[tokio::test]
    async fn test_upstream_failure_stores_nothing() {
        let (engine, state, telemetry) = engine_with(5.0, 0).await;
        telemetry.set_unavailable(true);
        let err = engine.orchestrate("ENGINE-001").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Telemetry { .. }));
        assert!(state.last_decision.latest().is_none());
    }

    #[tokio::test]
    async fn test_missing_unit_is_error() {
        let (engine, _, _) = engine_with(5.0, 0).await;
        assert!(matches!(
            engine.orchestrate("ENGINE-404").await,
            Err(OrchestrationError::NoTelemetry(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_store_hits_deadline() {
        let state = Arc::new(TwinState::new(Duration::from_secs(30)));
        let telemetry = Arc::new(MemoryTelemetrySource::new());
        telemetry.push(reading(5.0)).await;
        telemetry.set_latency(Some(Duration::from_millis(300)));
        let settings = EngineSettings {
            request_timeout: Duration::from_millis(20),
            ..EngineSettings::default()
        };
        let engine = OrchestrationEngine::new(
            state,
            telemetry,
            Arc::new(MemoryPersonnelSource::with_technician("Soufiane", 4.0)),
            Arc::new(FixedPolicy(0)),
            settings,
        );
        assert!(matches!(
            engine.orchestrate("ENGINE-001").await,
            Err(OrchestrationError::Telemetry { source: SourceError::Timeout(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_halt_snapshot_preferred_over_store() {
        let (engine, state, _) = engine_with(5.0, 1).await;
        let mut failure = reading(0.0);
        failure.vibration = 0.25;
        failure.cycle = 999;
        state.halt.trigger_failure(failure).await.unwrap();

        let d = engine.orchestrate("ENGINE-001").await.unwrap();
        assert_eq!(d.reading.remaining_life, 0.0);
        assert_eq!(d.status, UnitStatus::Critical);
        assert!(d.downtime.failure_timestamp.is_some());
    }
}
