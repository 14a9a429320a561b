//! Gantry Digital Twin
//!
//! Real-time orchestration core for a predictive-maintenance dashboard.
//!
//! ## Architecture
//!
//! - **Sources**: telemetry store, personnel roster, shipping policy, chat responder
//! - **Agents**: orchestration engine, shadow rule, narrated cycle
//! - **Pipeline**: halt state machine, broadcast hub, per-viewer live feed,
//!   failure injection / resume, auto-trigger poller
//! - **Chat**: override detection, context flattening, templated fallback
//! - **API**: Axum HTTP + WebSocket surface

pub mod agents;
pub mod api;
pub mod chat;
pub mod config;
pub mod pipeline;
pub mod sources;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, TwinConfig};

// Re-export commonly used types
pub use types::{
    Decision, FeedEvent, FinalAction, PersonnelStatus, PolicyAction, Reading, ShadowVerdict, StateVector,
    TelemetryPayload, UnitStatus,
};

// Re-export the runtime pieces
pub use agents::{OrchestrationEngine, OrchestrationError};
pub use pipeline::{BroadcastHub, Collaborators, IncidentCoordinator, LiveFeed, TwinRuntime, TwinState};
