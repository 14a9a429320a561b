//! Twin Runtime - wires collaborators into the shared components
//!
//! Everything the HTTP surface and background tasks need, built once at
//! startup and shared by `Arc`.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::auto_trigger::AutoTrigger;
use super::broadcast::BroadcastHub;
use super::coordinator::IncidentCoordinator;
use super::live_feed::LiveFeed;
use super::state::TwinState;
use crate::agents::{EngineSettings, Narrator, OrchestrationEngine};
use crate::chat::ChatService;
use crate::config::TwinConfig;
use crate::sources::{
    AgentBuilderResponder, ConversationalResponder, DecisionPolicy, ElasticPersonnelSource, ElasticTelemetrySource,
    MemoryPersonnelSource, MemoryTelemetrySource, PersonnelSource, RewardPolicy, SourceError, TelemetrySource,
};

/// Units seeded into the in-memory store in offline mode.
pub const OFFLINE_UNITS: &[&str] = &["ENGINE-001", "ENGINE-002", "ENGINE-003"];

// ============================================================================
// Collaborators
// ============================================================================

pub struct Collaborators {
    pub telemetry: Arc<dyn TelemetrySource>,
    pub personnel: Arc<dyn PersonnelSource>,
    pub policy: Arc<dyn DecisionPolicy>,
    pub responder: Option<Arc<dyn ConversationalResponder>>,
}

impl Collaborators {
    /// Elasticsearch-backed sources when configured, in-memory otherwise.
    pub fn from_config(config: &TwinConfig, offline: bool) -> Result<Self, SourceError> {
        if offline {
            info!("[TwinRuntime] Offline mode, using in-memory sources");
            return Ok(Self::offline(config));
        }
        if !config.elastic.is_configured() {
            warn!("[TwinRuntime] Elasticsearch not configured (ELASTIC_ES_URL / ELASTIC_ES_API_KEY), using in-memory sources");
            return Ok(Self::offline(config));
        }

        let telemetry = ElasticTelemetrySource::from_config(&config.elastic)?;
        let personnel = ElasticPersonnelSource::from_config(&config.elastic, config.personnel.fallback_shift_hours)?;
        info!(source = telemetry.source_name(), "[TwinRuntime] Using Elasticsearch sources");

        let responder: Option<Arc<dyn ConversationalResponder>> = if config.assistant.is_configured() {
            match AgentBuilderResponder::from_config(&config.assistant) {
                Ok(r) => Some(Arc::new(r)),
                Err(e) => {
                    warn!(error = %e, "[TwinRuntime] Assistant client init failed, chat uses templates");
                    None
                }
            }
        } else {
            info!("[TwinRuntime] Assistant not configured, chat uses templates");
            None
        };

        Ok(Self {
            telemetry: Arc::new(telemetry),
            personnel: Arc::new(personnel),
            policy: Arc::new(RewardPolicy::new(config.policy.clone())),
            responder,
        })
    }

    pub fn offline(config: &TwinConfig) -> Self {
        Self {
            telemetry: Arc::new(MemoryTelemetrySource::with_healthy_units(OFFLINE_UNITS)),
            personnel: Arc::new(MemoryPersonnelSource::with_technician(
                &config.personnel.technician,
                config.personnel.fallback_shift_hours,
            )),
            policy: Arc::new(RewardPolicy::new(config.policy.clone())),
            responder: None,
        }
    }
}

// ============================================================================
// Runtime
// ============================================================================

pub struct TwinRuntime {
    pub config: TwinConfig,
    pub state: Arc<TwinState>,
    pub hub: Arc<BroadcastHub>,
    pub engine: Arc<OrchestrationEngine>,
    pub feed: Arc<LiveFeed>,
    pub coordinator: Arc<IncidentCoordinator>,
    pub chat: Arc<ChatService>,
    telemetry: Arc<dyn TelemetrySource>,
    started_at: Instant,
}

impl TwinRuntime {
    pub fn new(config: TwinConfig, collaborators: Collaborators) -> Self {
        let feed_cfg = config.feed.clone();
        let request_timeout = config.elastic.request_timeout();

        let state = Arc::new(TwinState::new(Duration::from_secs(feed_cfg.grace_secs)));
        let hub = Arc::new(BroadcastHub::new(feed_cfg.subscriber_buffer));

        let engine = Arc::new(OrchestrationEngine::new(
            Arc::clone(&state),
            Arc::clone(&collaborators.telemetry),
            collaborators.personnel,
            collaborators.policy,
            EngineSettings::from_config(&config),
        ));
        let narrator = Arc::new(Narrator::new(
            Arc::clone(&engine),
            Arc::clone(&hub),
            config.narration.pacing_enabled,
        ));
        let feed = Arc::new(LiveFeed::new(
            Arc::clone(&state),
            Arc::clone(&collaborators.telemetry),
            Arc::clone(&hub),
            feed_cfg.clone(),
            request_timeout,
        ));
        let coordinator = Arc::new(IncidentCoordinator::new(
            Arc::clone(&state),
            Arc::clone(&hub),
            narrator,
            Arc::clone(&collaborators.telemetry),
            request_timeout,
            feed_cfg.active_window_secs,
        ));
        let chat = Arc::new(ChatService::new(
            Arc::clone(&state),
            collaborators.responder,
            Duration::from_secs(config.assistant.timeout_secs),
        ));

        info!(
            policy = engine.policy_name(),
            telemetry = collaborators.telemetry.source_name(),
            pacing = config.narration.pacing_enabled,
            "[TwinRuntime] Components initialized"
        );

        Self {
            config,
            state,
            hub,
            engine,
            feed,
            coordinator,
            chat,
            telemetry: collaborators.telemetry,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn telemetry_source_name(&self) -> &str {
        self.telemetry.source_name()
    }

    /// Background poller for end-of-life readings (spawn only when enabled).
    pub fn auto_trigger(&self) -> AutoTrigger {
        AutoTrigger::new(
            Arc::clone(&self.state),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.coordinator),
            self.config.auto_trigger.clone(),
            self.config.elastic.request_timeout(),
        )
    }
}
