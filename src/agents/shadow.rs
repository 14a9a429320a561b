//! Shadow Model - threshold rule run alongside the policy
//!
//! The rule approves express shipping whenever remaining life is below 10.
//! It never changes the outcome; it only reports whether it would have.

use crate::config::defaults;
use crate::types::{PersonnelStatus, PolicyAction, Reading, ShadowVerdict};

#[derive(Debug, Clone, Copy)]
pub struct ShadowEvaluator {
    approve_below_rul: f64,
}

impl Default for ShadowEvaluator {
    fn default() -> Self {
        Self {
            approve_below_rul: defaults::SHADOW_APPROVE_RUL,
        }
    }
}

impl ShadowEvaluator {
    /// Compare the rule against the pre-override `policy_action`.
    ///
    /// `estimated_cost_saved` depends on the policy action alone, not on
    /// whether the two disagree.
    pub fn evaluate(
        &self,
        reading: &Reading,
        personnel: &PersonnelStatus,
        policy_action: PolicyAction,
        part_cost: f64,
    ) -> ShadowVerdict {
        let rul = reading.remaining_life;
        let rule_approve = rul < self.approve_below_rul;
        let rule_decision = if rule_approve {
            PolicyAction::Approve
        } else {
            PolicyAction::Veto
        };

        let rule_reason = if rule_approve {
            format!("RUL={rul:.1} < {} → failure imminent, ship part now.", self.approve_below_rul)
        } else {
            format!("RUL={rul:.1} ≥ {} → no urgency.", self.approve_below_rul)
        };

        ShadowVerdict {
            rule_decision,
            rule_reason,
            policy_decision: policy_action,
            policy_reason: format!(
                "Optimized for labor availability: tech has {:.1}h left on shift.",
                personnel.hours_until_shift_end
            ),
            conflict: rule_approve != policy_action.is_approve(),
            verdict: policy_action,
            estimated_cost_saved: if policy_action.is_approve() { 0.0 } else { part_cost },
        }
    }
}
