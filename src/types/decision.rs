//! Decision record and its building blocks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::telemetry::{PersonnelStatus, Reading, StateVector, UnitStatus};
use crate::config::defaults;

// ============================================================================
// Policy Action
// ============================================================================

/// Binary policy output. `0 = Veto` (standard shipping), `1 = Approve` (express).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyAction {
    Veto,
    Approve,
}

impl PolicyAction {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Veto),
            1 => Some(Self::Approve),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Veto => 0,
            Self::Approve => 1,
        }
    }

    pub fn is_approve(self) -> bool {
        matches!(self, Self::Approve)
    }

    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Veto => Self::Approve,
            Self::Approve => Self::Veto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Veto => "VETO",
            Self::Approve => "APPROVE",
        }
    }

    pub fn final_action(self) -> FinalAction {
        match self {
            Self::Veto => FinalAction::VetoExpressShipping,
            Self::Approve => FinalAction::ApproveExpressShipping,
        }
    }
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Final, possibly overridden, shipping decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalAction {
    ApproveExpressShipping,
    VetoExpressShipping,
}

impl FinalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApproveExpressShipping => "APPROVE_EXPRESS_SHIPPING",
            Self::VetoExpressShipping => "VETO_EXPRESS_SHIPPING",
        }
    }
}

impl std::fmt::Display for FinalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Shadow Verdict
// ============================================================================

/// Threshold rule vs policy comparison. The policy is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShadowVerdict {
    pub rule_decision: PolicyAction,
    pub rule_reason: String,
    pub policy_decision: PolicyAction,
    pub policy_reason: String,
    pub conflict: bool,
    pub verdict: PolicyAction,
    pub estimated_cost_saved: f64,
}

// ============================================================================
// Decision Parts
// ============================================================================

/// One entry of a decision's orchestration log, also the narrated step shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestrationStep {
    pub step: u32,
    pub agent: String,
    pub event: String,
}

impl OrchestrationStep {
    pub fn new(step: u32, agent: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            step,
            agent: agent.into(),
            event: event.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyOutcome {
    /// Action the policy returned, before any override.
    pub raw_action: PolicyAction,
    /// Action after any override.
    pub action: PolicyAction,
    /// `action` as the policy's wire code (0 = veto, 1 = approve).
    pub action_code: u8,
    pub label: FinalAction,
    pub reason: String,
    pub overridden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostImpact {
    pub part_cost: f64,
    pub cost_saved: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyCost {
    pub label: String,
    pub cost: f64,
    pub downtime_hours: f64,
    pub description: String,
}

/// Annual fleet cost of the three maintenance strategies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostComparison {
    pub reactive: StrategyCost,
    pub preventive: StrategyCost,
    pub predictive: StrategyCost,
    pub savings_vs_reactive: f64,
    pub savings_vs_preventive: f64,
    pub savings_pct_reactive: f64,
    pub savings_pct_preventive: f64,
}

impl CostComparison {
    pub fn standard() -> Self {
        let pct = |base: f64| round1((1.0 - defaults::COST_PREDICTIVE / base) * 100.0);
        Self {
            reactive: StrategyCost {
                label: "Reactive (Run-to-Failure)".to_string(),
                cost: defaults::COST_REACTIVE,
                downtime_hours: defaults::DOWNTIME_REACTIVE_HR,
                description: "No monitoring, wait for catastrophic failure, emergency repair."
                    .to_string(),
            },
            preventive: StrategyCost {
                label: "Preventive (Scheduled)".to_string(),
                cost: defaults::COST_PREVENTIVE,
                downtime_hours: defaults::DOWNTIME_PREVENTIVE_HR,
                description: "Fixed-interval maintenance, often replaces healthy parts.".to_string(),
            },
            predictive: StrategyCost {
                label: "Predictive (Gantry)".to_string(),
                cost: defaults::COST_PREDICTIVE,
                downtime_hours: defaults::DOWNTIME_PREDICTIVE_HR,
                description: "Just-in-time part swap during the optimal shift window.".to_string(),
            },
            savings_vs_reactive: defaults::COST_REACTIVE - defaults::COST_PREDICTIVE,
            savings_vs_preventive: defaults::COST_PREVENTIVE - defaults::COST_PREDICTIVE,
            savings_pct_reactive: pct(defaults::COST_REACTIVE),
            savings_pct_preventive: pct(defaults::COST_PREVENTIVE),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DowntimeInfo {
    pub failure_timestamp: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
}

// ============================================================================
// Decision
// ============================================================================

/// Output of one orchestration cycle. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub unit_id: String,
    pub status: UnitStatus,
    pub reading: Reading,
    pub personnel: PersonnelStatus,
    pub state_vector: StateVector,
    pub policy: PolicyOutcome,
    pub shadow: ShadowVerdict,
    pub overridden: bool,
    pub cost_impact: CostImpact,
    pub cost_comparison: CostComparison,
    pub downtime: DowntimeInfo,
    pub data_volume: String,
    pub steps: Vec<OrchestrationStep>,
    pub final_action: FinalAction,
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
