//! Shipping decision policies
//!
//! The production policy was trained on a single-step environment: each
//! episode scores one shipping choice and terminates. The optimal policy for
//! such an environment is the argmax of the immediate reward, which
//! [`RewardPolicy`] evaluates directly from the same reward shape.

use super::{DecisionPolicy, PolicyError};
use crate::config::PolicyConfig;
use crate::types::{PolicyAction, StateVector};

/// Argmax-of-reward policy over `[rul, vibration, shift_hours, part_cost]`.
///
/// Ties resolve to [`PolicyAction::Veto`].
#[derive(Debug, Clone)]
pub struct RewardPolicy {
    config: PolicyConfig,
}

impl RewardPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Immediate reward of approving express shipping.
    pub fn approve_reward(&self, state: &StateVector) -> f64 {
        let c = &self.config;
        let install = if state.hours_until_shift_end() > c.min_install_hours {
            c.express_bonus
        } else {
            -c.late_install_penalty
        };
        install - state.part_cost()
    }

    /// Immediate reward of standard shipping.
    pub fn veto_reward(&self, state: &StateVector) -> f64 {
        let c = &self.config;
        if state.remaining_life() > c.min_safe_rul {
            c.veto_bonus
        } else {
            -c.failure_penalty
        }
    }
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl DecisionPolicy for RewardPolicy {
    fn evaluate(&self, state: &StateVector) -> Result<PolicyAction, PolicyError> {
        for (index, value) in state.as_array().into_iter().enumerate() {
            if !value.is_finite() {
                return Err(PolicyError::NonFiniteInput { index, value });
            }
        }
        if self.approve_reward(state) > self.veto_reward(state) {
            Ok(PolicyAction::Approve)
        } else {
            Ok(PolicyAction::Veto)
        }
    }

    fn policy_name(&self) -> &str {
        "reward-argmax"
    }
}

/// Policy that always answers with the same action code.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub u8);

impl DecisionPolicy for FixedPolicy {
    fn evaluate(&self, _state: &StateVector) -> Result<PolicyAction, PolicyError> {
        PolicyAction::from_code(self.0).ok_or(PolicyError::UnknownAction(self.0))
    }

    fn policy_name(&self) -> &str {
        "fixed"
    }
}
