//! Decision agents for the maintenance digital twin
//!
//! - **Orchestration Engine**: telemetry + personnel → policy → Decision
//! - **Shadow Model**: fixed threshold rule compared against the policy
//! - **Narrator**: the same cycle, broadcast step by step to live viewers

pub mod narration;
pub mod orchestrator;
pub mod shadow;

pub use narration::{Narrator, StepDescriptor, ERROR_STEP};
pub use orchestrator::{
    build_step_log, decision_reason, labor_mismatch_risk, EngineSettings, Evaluation, OrchestrationEngine,
    OrchestrationError,
};
pub use shadow::ShadowEvaluator;
