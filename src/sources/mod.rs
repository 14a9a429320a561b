//! External collaborators of the orchestration core
//!
//! Each upstream the core consumes sits behind a trait so the engine, feed and
//! chat service can run against Elasticsearch in production and against the
//! in-memory implementations in offline mode and tests.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::types::{PersonnelStatus, PolicyAction, Reading, StateVector, UnitActivity};

pub mod assistant;
pub mod elastic;
pub mod memory;
pub mod policy;

pub use assistant::AgentBuilderResponder;
pub use elastic::{ElasticClient, ElasticPersonnelSource, ElasticTelemetrySource};
pub use memory::{MemoryPersonnelSource, MemoryTelemetrySource, ScriptedResponder};
pub use policy::{FixedPolicy, RewardPolicy};

// ============================================================================
// Errors
// ============================================================================

/// Failure talking to, or interpreting data from, an upstream store.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed upstream data: {0}")]
    Malformed(String),
}

/// Policy evaluation failure.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("State vector component {index} is not finite ({value})")]
    NonFiniteInput { index: usize, value: f64 },
    #[error("Policy returned unknown action code {0}")]
    UnknownAction(u8),
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Stored engine telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Most recent reading for `unit_id`, or `None` when the store has none.
    async fn latest(&self, unit_id: &str) -> Result<Option<Reading>, SourceError>;

    /// Per-unit aggregates for the unit picker (unranked).
    async fn list_units(&self) -> Result<Vec<UnitActivity>, SourceError>;

    /// Readings reporting end of life within the last `lookback`.
    async fn recent_critical(&self, lookback: Duration) -> Result<Vec<Reading>, SourceError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// Technician roster.
#[async_trait]
pub trait PersonnelSource: Send + Sync + 'static {
    async fn lookup(&self, technician: &str) -> Result<PersonnelStatus, SourceError>;
}

/// Pre-trained shipping policy. Deterministic, fast and side-effect free.
pub trait DecisionPolicy: Send + Sync + 'static {
    fn evaluate(&self, state: &StateVector) -> Result<PolicyAction, PolicyError>;

    fn policy_name(&self) -> &str;
}

/// Free-text assistant answering questions about the current decision.
#[async_trait]
pub trait ConversationalResponder: Send + Sync + 'static {
    /// `context` is the flattened current state, `message` the operator text.
    async fn reply(&self, context: &str, message: &str) -> Result<String, SourceError>;
}

/// Bound an upstream call by `deadline`; expiry becomes [`SourceError::Timeout`].
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| SourceError::Timeout(deadline))?
}
